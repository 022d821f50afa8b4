//! In-memory backing store shared by every service.
//!
//! The durable persistence engine is an external collaborator; this store is
//! the in-process state the core operates on, playing the role a pooled
//! database connection plays elsewhere. All maps are concurrent; multi-step
//! workflows get their atomicity from the per-facility allocation mutex, the
//! atomic active-session claim, and compensating rollback in the
//! coordinator rather than from a storage transaction.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::entities::{Facility, Session, Slot, SlotStatus, Vehicle};

#[derive(Default)]
pub struct InMemoryStore {
    facilities: DashMap<Uuid, Facility>,
    /// Unique-name index: facility name -> facility id.
    facility_names: DashMap<String, Uuid>,

    slots: DashMap<Uuid, Slot>,
    /// Slot ids per facility, ordered by slot number (slots are only ever
    /// appended in numbering order).
    facility_slots: DashMap<Uuid, Vec<Uuid>>,

    vehicles: DashMap<Uuid, Vehicle>,
    /// Unique-plate index: normalized vehicle number -> vehicle id.
    vehicle_numbers: DashMap<String, Uuid>,

    sessions: DashMap<Uuid, Session>,
    /// The one-active-session-per-vehicle invariant lives here: an entry
    /// claim on this map is the authoritative, atomic check.
    active_sessions: DashMap<Uuid, Uuid>,

    /// Per-facility mutex serializing find-first-available + occupy.
    allocation_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- facilities ----

    /// Claims a facility name. Returns false if another facility holds it.
    pub fn claim_facility_name(&self, name: &str, facility_id: Uuid) -> bool {
        match self.facility_names.entry(name.to_string()) {
            Entry::Occupied(existing) => *existing.get() == facility_id,
            Entry::Vacant(vacant) => {
                vacant.insert(facility_id);
                true
            }
        }
    }

    pub fn release_facility_name(&self, name: &str) {
        self.facility_names.remove(name);
    }

    pub fn put_facility(&self, facility: Facility) {
        self.facilities.insert(facility.id, facility);
    }

    pub fn get_facility(&self, facility_id: Uuid) -> Option<Facility> {
        self.facilities.get(&facility_id).map(|f| f.clone())
    }

    pub fn list_facilities(&self) -> Vec<Facility> {
        let mut facilities: Vec<Facility> =
            self.facilities.iter().map(|f| f.value().clone()).collect();
        facilities.sort_by_key(|f| f.created_at);
        facilities
    }

    /// Removes the facility record, its slots, and its allocation lock.
    /// Session handling (retain vs. cascade) is the caller's decision.
    pub fn remove_facility(&self, facility_id: Uuid) {
        if let Some((_, facility)) = self.facilities.remove(&facility_id) {
            self.facility_names
                .remove_if(&facility.name, |_, id| *id == facility_id);
        }
        if let Some((_, slot_ids)) = self.facility_slots.remove(&facility_id) {
            for slot_id in slot_ids {
                self.slots.remove(&slot_id);
            }
        }
        self.allocation_locks.remove(&facility_id);
    }

    // ---- slots ----

    pub fn push_slot(&self, slot: Slot) {
        let facility_id = slot.facility_id;
        let slot_id = slot.id;
        self.slots.insert(slot_id, slot);
        self.facility_slots
            .entry(facility_id)
            .or_default()
            .push(slot_id);
    }

    pub fn get_slot(&self, slot_id: Uuid) -> Option<Slot> {
        self.slots.get(&slot_id).map(|s| s.clone())
    }

    /// Mutates a slot in place under its shard lock.
    pub fn with_slot_mut<R>(&self, slot_id: Uuid, f: impl FnOnce(&mut Slot) -> R) -> Option<R> {
        self.slots.get_mut(&slot_id).map(|mut slot| f(&mut slot))
    }

    /// Slots of a facility in slot-number order.
    pub fn slots_of(&self, facility_id: Uuid) -> Vec<Slot> {
        let slot_ids = match self.facility_slots.get(&facility_id) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };
        slot_ids
            .into_iter()
            .filter_map(|id| self.get_slot(id))
            .collect()
    }

    /// Lowest-numbered Available slot, if any. Callers needing the
    /// find+occupy pair to be exclusive must hold the facility's
    /// allocation lock across both steps.
    pub fn first_available_slot(&self, facility_id: Uuid) -> Option<Slot> {
        self.slots_of(facility_id)
            .into_iter()
            .find(|slot| slot.status == SlotStatus::Available)
    }

    /// Lock-free count; momentarily stale values are acceptable.
    pub fn count_slots(&self, facility_id: Uuid, status: SlotStatus) -> i64 {
        self.slots_of(facility_id)
            .iter()
            .filter(|slot| slot.status == status)
            .count() as i64
    }

    // ---- vehicles ----

    pub fn get_vehicle(&self, vehicle_id: Uuid) -> Option<Vehicle> {
        self.vehicles.get(&vehicle_id).map(|v| v.clone())
    }

    pub fn get_vehicle_by_number(&self, vehicle_number: &str) -> Option<Vehicle> {
        let id = *self.vehicle_numbers.get(vehicle_number)?;
        self.get_vehicle(id)
    }

    /// Inserts a vehicle unless its number is already registered; the
    /// existing record is returned in that case. The plate-index entry is
    /// the atomic claim, so two concurrent registrations of one plate
    /// resolve to a single record.
    pub fn insert_vehicle(&self, vehicle: Vehicle) -> Result<Vehicle, Vehicle> {
        match self.vehicle_numbers.entry(vehicle.vehicle_number.clone()) {
            Entry::Occupied(existing) => {
                let existing_id = *existing.get();
                drop(existing);
                match self.get_vehicle(existing_id) {
                    Some(found) => Err(found),
                    // Index pointed at a record mid-removal; retry as insert.
                    None => {
                        self.vehicles.insert(vehicle.id, vehicle.clone());
                        self.vehicle_numbers
                            .insert(vehicle.vehicle_number.clone(), vehicle.id);
                        Ok(vehicle)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                self.vehicles.insert(vehicle.id, vehicle.clone());
                vacant.insert(vehicle.id);
                Ok(vehicle)
            }
        }
    }

    /// Compensating removal for a registration whose enclosing entry
    /// failed. Skipped when the vehicle has since acquired an active
    /// session (another entry flow won the race and owns it now).
    pub fn remove_vehicle_if_inactive(&self, vehicle_id: Uuid) -> bool {
        if self.active_sessions.contains_key(&vehicle_id) {
            return false;
        }
        let Some((_, vehicle)) = self.vehicles.remove(&vehicle_id) else {
            return false;
        };
        // A concurrent entry for the same plate may have claimed the
        // vehicle between the check and the removal; put it back.
        if self.active_sessions.contains_key(&vehicle_id) {
            self.vehicles.insert(vehicle_id, vehicle);
            return false;
        }
        self.vehicle_numbers
            .remove_if(&vehicle.vehicle_number, |_, id| *id == vehicle_id);
        true
    }

    // ---- sessions ----

    pub fn insert_session(&self, session: Session) {
        self.sessions.insert(session.id, session);
    }

    pub fn get_session(&self, session_id: Uuid) -> Option<Session> {
        self.sessions.get(&session_id).map(|s| s.clone())
    }

    /// Mutates a session in place under its shard lock. The closure runs
    /// with exclusive access, which is what makes the version
    /// compare-and-swap in the ledger atomic.
    pub fn with_session_mut<R>(
        &self,
        session_id: Uuid,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        self.sessions
            .get_mut(&session_id)
            .map(|mut session| f(&mut session))
    }

    /// Atomically claims the active-session slot for a vehicle.
    pub fn claim_active_session(&self, vehicle_id: Uuid, session_id: Uuid) -> bool {
        match self.active_sessions.entry(vehicle_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(session_id);
                true
            }
        }
    }

    /// Drops the active-session claim, but only if it still points at the
    /// given session.
    pub fn release_active_session(&self, vehicle_id: Uuid, session_id: Uuid) {
        self.active_sessions
            .remove_if(&vehicle_id, |_, current| *current == session_id);
    }

    pub fn active_session_of(&self, vehicle_id: Uuid) -> Option<Session> {
        let session_id = *self.active_sessions.get(&vehicle_id)?;
        self.get_session(session_id)
    }

    /// Whether any Active session belongs to the facility.
    pub fn facility_has_active_sessions(&self, facility_id: Uuid) -> bool {
        self.sessions
            .iter()
            .any(|s| s.facility_id == facility_id && s.is_active())
    }

    /// Snapshot of sessions, optionally scoped to one facility, ordered by
    /// entry time.
    pub fn sessions_snapshot(
        &self,
        facility_id: Option<Uuid>,
        mut keep: impl FnMut(&Session) -> bool,
    ) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|s| facility_id.map_or(true, |id| s.facility_id == id))
            .filter(|s| keep(s))
            .map(|s| s.value().clone())
            .collect();
        sessions.sort_by_key(|s| s.entry_time);
        sessions
    }

    /// Cascade used when facility deletion is configured to drop history.
    pub fn remove_facility_sessions(&self, facility_id: Uuid) {
        self.sessions.retain(|_, s| s.facility_id != facility_id);
    }

    // ---- allocation locks ----

    /// The mutex serializing slot allocation for one facility. Created on
    /// first use; facilities never contend with each other.
    pub fn allocation_lock(&self, facility_id: Uuid) -> Arc<Mutex<()>> {
        self.allocation_locks
            .entry(facility_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
