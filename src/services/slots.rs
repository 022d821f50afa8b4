use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{Slot, SlotStatus};
use crate::errors::ServiceError;
use crate::store::InMemoryStore;

/// Physical slot inventory for the facilities.
///
/// Concurrency contract: `allocate_first_available` runs the find-lowest
/// and occupy steps as one critical section keyed by facility id, so two
/// concurrent entries to one facility are never handed the same slot.
/// Facilities never block each other.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SlotAllocator: Send + Sync {
    /// Creates slots `from_number..=to_number` for the facility, all
    /// Available. Used at facility creation and expansion; the caller owns
    /// the facility's existence and numbering continuity.
    async fn create_slots(
        &self,
        facility_id: Uuid,
        from_number: i32,
        to_number: i32,
    ) -> Result<(), ServiceError>;

    /// Occupies and returns the lowest-numbered Available slot.
    /// `Conflict` when the lot is full.
    async fn allocate_first_available(&self, facility_id: Uuid) -> Result<Slot, ServiceError>;

    /// Marks a slot Occupied. Part of the allocation path via
    /// `allocate_first_available`; exposed for completeness.
    async fn occupy(&self, slot_id: Uuid) -> Result<(), ServiceError>;

    /// Marks a slot Available again.
    async fn release(&self, slot_id: Uuid) -> Result<(), ServiceError>;

    /// Approximate, lock-free count for occupancy and display reads.
    async fn count_by_status(
        &self,
        facility_id: Uuid,
        status: SlotStatus,
    ) -> Result<i64, ServiceError>;

    /// Slots of a facility in slot-number order.
    async fn slots_for_facility(&self, facility_id: Uuid) -> Result<Vec<Slot>, ServiceError>;
}

#[derive(Clone)]
pub struct SlotService {
    store: Arc<InMemoryStore>,
}

impl SlotService {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }

    fn set_status(&self, slot_id: Uuid, status: SlotStatus) -> Result<(), ServiceError> {
        let previous = self
            .store
            .with_slot_mut(slot_id, |slot| {
                let previous = slot.status;
                slot.status = status;
                previous
            })
            .ok_or_else(|| ServiceError::NotFound("Slot not found".to_string()))?;

        if previous == status {
            warn!(slot_id = %slot_id, status = %status, "Slot status unchanged");
        }
        Ok(())
    }
}

#[async_trait]
impl SlotAllocator for SlotService {
    #[instrument(skip(self))]
    async fn create_slots(
        &self,
        facility_id: Uuid,
        from_number: i32,
        to_number: i32,
    ) -> Result<(), ServiceError> {
        if from_number < 1 || to_number < from_number {
            return Err(ServiceError::InvalidInput(format!(
                "Invalid slot range {}..={}",
                from_number, to_number
            )));
        }

        for slot_number in from_number..=to_number {
            self.store.push_slot(Slot {
                id: Uuid::new_v4(),
                facility_id,
                slot_number,
                status: SlotStatus::Available,
            });
        }

        info!(
            facility_id = %facility_id,
            from_number,
            to_number,
            "Slots created"
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn allocate_first_available(&self, facility_id: Uuid) -> Result<Slot, ServiceError> {
        if self.store.get_facility(facility_id).is_none() {
            return Err(ServiceError::NotFound(
                "Parking facility not found".to_string(),
            ));
        }

        // Exclusive critical section scoped to this facility's slot set.
        let lock = self.store.allocation_lock(facility_id);
        let _guard = lock.lock().await;

        let slot = self
            .store
            .first_available_slot(facility_id)
            .ok_or_else(|| ServiceError::Conflict("Parking lot is full".to_string()))?;

        self.set_status(slot.id, SlotStatus::Occupied)?;

        info!(
            facility_id = %facility_id,
            slot_id = %slot.id,
            slot_number = slot.slot_number,
            "Slot allocated"
        );
        Ok(Slot {
            status: SlotStatus::Occupied,
            ..slot
        })
    }

    #[instrument(skip(self))]
    async fn occupy(&self, slot_id: Uuid) -> Result<(), ServiceError> {
        self.set_status(slot_id, SlotStatus::Occupied)
    }

    #[instrument(skip(self))]
    async fn release(&self, slot_id: Uuid) -> Result<(), ServiceError> {
        self.set_status(slot_id, SlotStatus::Available)
    }

    async fn count_by_status(
        &self,
        facility_id: Uuid,
        status: SlotStatus,
    ) -> Result<i64, ServiceError> {
        Ok(self.store.count_slots(facility_id, status))
    }

    async fn slots_for_facility(&self, facility_id: Uuid) -> Result<Vec<Slot>, ServiceError> {
        Ok(self.store.slots_of(facility_id))
    }
}
