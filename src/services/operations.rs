use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{SlotStatus, Vehicle, VehicleType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::facilities::FacilityDirectory;
use crate::services::pricing::PricingEngine;
use crate::services::sessions::{SessionLedger, SessionView};
use crate::services::slots::SlotAllocator;
use crate::services::vehicles::VehicleRegistry;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EntryRequest {
    #[validate(length(min = 1, max = 32, message = "Vehicle number is required"))]
    pub vehicle_number: String,

    pub vehicle_type: VehicleType,

    pub facility_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExitRequest {
    #[validate(length(min = 1, max = 32, message = "Vehicle number is required"))]
    pub vehicle_number: String,

    pub facility_id: Uuid,
}

/// Confirmation returned on successful entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub session_id: Uuid,
    pub vehicle_number: String,
    pub vehicle_type: VehicleType,
    pub slot_number: i32,
    pub facility_name: String,
    pub entry_time: DateTime<Utc>,
}

/// Charge summary returned on exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub session_id: Uuid,
    pub vehicle_number: String,
    pub facility_name: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub billable_hours: i64,
    pub base_price_per_hour: Decimal,
    pub applied_multiplier: Decimal,
    pub total_amount: Decimal,
}

/// Orchestrates entry and exit as single atomic operations.
///
/// Depends only on the capability interfaces, so every collaborator is
/// swappable. Each operation validates and fails fast before mutating;
/// failures after a mutation trigger compensating rollback so no orphaned
/// occupied slot or phantom session survives.
#[derive(Clone)]
pub struct ParkingOperationsService {
    facilities: Arc<dyn FacilityDirectory>,
    vehicles: Arc<dyn VehicleRegistry>,
    slots: Arc<dyn SlotAllocator>,
    sessions: Arc<dyn SessionLedger>,
    pricing: Arc<dyn PricingEngine>,
    event_sender: Option<EventSender>,
}

impl ParkingOperationsService {
    pub fn new(
        facilities: Arc<dyn FacilityDirectory>,
        vehicles: Arc<dyn VehicleRegistry>,
        slots: Arc<dyn SlotAllocator>,
        sessions: Arc<dyn SessionLedger>,
        pricing: Arc<dyn PricingEngine>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            facilities,
            vehicles,
            slots,
            sessions,
            pricing,
            event_sender,
        }
    }

    /// Vehicle entry workflow:
    /// 1. Validate the facility.
    /// 2. Find or register the vehicle.
    /// 3. Refuse a second active session.
    /// 4. Allocate the lowest free slot (exclusive per facility).
    /// 5. Open the session.
    #[instrument(skip(self, request), fields(vehicle_number = %request.vehicle_number, facility_id = %request.facility_id))]
    pub async fn enter_vehicle(&self, request: EntryRequest) -> Result<Ticket, ServiceError> {
        request.validate()?;

        let facility = self.facilities.get(request.facility_id).await?;

        let (vehicle, vehicle_created) = self
            .vehicles
            .find_or_create(&request.vehicle_number, request.vehicle_type)
            .await?;

        // Fast-path check; the ledger's create repeats it atomically.
        if self.sessions.find_active(vehicle.id).await?.is_some() {
            self.rollback_vehicle(vehicle_created, &vehicle).await;
            return Err(ServiceError::Conflict(
                "Vehicle already has an active session".to_string(),
            ));
        }

        let slot = match self.slots.allocate_first_available(facility.id).await {
            Ok(slot) => slot,
            Err(e) => {
                self.rollback_vehicle(vehicle_created, &vehicle).await;
                return Err(e);
            }
        };

        let session = match self.sessions.create(vehicle.id, slot.id, facility.id).await {
            Ok(session) => session,
            Err(e) => {
                // Undo the occupation; the slot must not stay orphaned.
                if let Err(release_err) = self.slots.release(slot.id).await {
                    error!(
                        slot_id = %slot.id,
                        error = %release_err,
                        "Failed to roll back slot occupation"
                    );
                }
                self.rollback_vehicle(vehicle_created, &vehicle).await;
                return Err(e);
            }
        };

        info!(
            session_id = %session.id,
            slot_number = slot.slot_number,
            "Vehicle entered"
        );

        if self.event_sender.is_some() {
            if let Ok(view) = self.sessions.view(&session).await {
                self.emit(Event::SessionEntry {
                    facility_id: facility.id,
                    session: view,
                })
                .await;
            }
            self.publish_slot_update(facility.id).await;
        }

        Ok(Ticket {
            session_id: session.id,
            vehicle_number: vehicle.vehicle_number,
            vehicle_type: vehicle.vehicle_type,
            slot_number: slot.slot_number,
            facility_name: facility.name,
            entry_time: session.entry_time,
        })
    }

    /// Vehicle exit workflow:
    /// 1. Resolve the vehicle and its active session.
    /// 2. Verify the session belongs to the requested facility.
    /// 3. Pre-fetch billing inputs, reading occupancy before the slot is
    ///    released so the bill reflects the lot as it stood.
    /// 4. Price, complete the session, free the slot.
    #[instrument(skip(self, request), fields(vehicle_number = %request.vehicle_number, facility_id = %request.facility_id))]
    pub async fn exit_vehicle(&self, request: ExitRequest) -> Result<Bill, ServiceError> {
        request.validate()?;

        let vehicle = self
            .vehicles
            .find_by_number(&request.vehicle_number)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Vehicle not found".to_string()))?;

        let session = self
            .sessions
            .find_active(vehicle.id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("No active session found".to_string()))?;

        if session.facility_id != request.facility_id {
            return Err(ServiceError::Conflict(format!(
                "Vehicle is not parked in facility {}",
                request.facility_id
            )));
        }

        // Pre-fetch everything the bill needs before any mutation.
        let facility = self.facilities.get(session.facility_id).await?;
        let base_price = facility.base_price_per_hour;
        let total_slots = facility.total_slots;
        let slot_id = session.slot_id;

        let occupied = self
            .slots
            .count_by_status(facility.id, SlotStatus::Occupied)
            .await?;

        let exit_time = Utc::now();
        let quote = self.pricing.calculate(
            session.entry_time,
            exit_time,
            base_price,
            occupied,
            total_slots,
        )?;

        let ended = self
            .sessions
            .end(&session, exit_time, quote.total_amount)
            .await?;

        self.slots.release(slot_id).await?;

        info!(
            session_id = %ended.id,
            total_amount = %quote.total_amount,
            billable_hours = quote.billable_hours,
            "Vehicle exited"
        );

        if self.event_sender.is_some() {
            if let Ok(view) = self.sessions.view(&ended).await {
                self.emit(Event::SessionEnd {
                    facility_id: facility.id,
                    session: view,
                })
                .await;
            }
            self.publish_slot_update(facility.id).await;
        }

        Ok(Bill {
            session_id: ended.id,
            vehicle_number: vehicle.vehicle_number,
            facility_name: facility.name,
            entry_time: ended.entry_time,
            exit_time,
            duration_minutes: quote.duration_minutes,
            billable_hours: quote.billable_hours,
            base_price_per_hour: base_price,
            applied_multiplier: quote.applied_multiplier,
            total_amount: quote.total_amount,
        })
    }

    /// Forcefully closes an active session: zero charge, Terminated
    /// status, slot freed by the ledger.
    #[instrument(skip(self))]
    pub async fn terminate_session(&self, session_id: Uuid) -> Result<SessionView, ServiceError> {
        let terminated = self.sessions.terminate(session_id).await?;

        let view = self.sessions.view(&terminated).await?;
        self.emit(Event::SessionEnd {
            facility_id: terminated.facility_id,
            session: view.clone(),
        })
        .await;
        self.publish_slot_update(terminated.facility_id).await;

        Ok(view)
    }

    pub async fn list_active_sessions(
        &self,
        facility_id: Option<Uuid>,
    ) -> Result<Vec<SessionView>, ServiceError> {
        self.sessions.list_active(facility_id).await
    }

    pub async fn list_session_history(
        &self,
        facility_id: Option<Uuid>,
    ) -> Result<Vec<SessionView>, ServiceError> {
        self.sessions.list_all(facility_id).await
    }

    async fn rollback_vehicle(&self, created: bool, vehicle: &Vehicle) {
        if !created {
            return;
        }
        if let Err(e) = self.vehicles.discard_registration(vehicle.id).await {
            error!(
                vehicle_id = %vehicle.id,
                error = %e,
                "Failed to roll back vehicle registration"
            );
        }
    }

    /// Publishes the refreshed availability for a facility. Fire and
    /// forget: failures are logged and never surface to the caller.
    async fn publish_slot_update(&self, facility_id: Uuid) {
        if self.event_sender.is_none() {
            return;
        }

        let facility = match self.facilities.get(facility_id).await {
            Ok(facility) => facility,
            Err(e) => {
                warn!(facility_id = %facility_id, error = %e, "Skipping slot update event");
                return;
            }
        };
        let occupied = match self
            .slots
            .count_by_status(facility_id, SlotStatus::Occupied)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(facility_id = %facility_id, error = %e, "Skipping slot update event");
                return;
            }
        };

        let available = facility.total_slots - occupied as i32;
        self.emit(Event::SlotAvailabilityChanged {
            facility_id,
            available_slots: available,
            total_slots: facility.total_slots,
        })
        .await;
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send domain event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use mockall::predicate::eq;
    use rust_decimal_macros::dec;

    use crate::entities::{Facility, Session, SessionStatus, Slot};
    use crate::services::facilities::MockFacilityDirectory;
    use crate::services::pricing::{MockPricingEngine, Quote};
    use crate::services::sessions::MockSessionLedger;
    use crate::services::slots::MockSlotAllocator;
    use crate::services::vehicles::MockVehicleRegistry;

    fn facility(id: Uuid) -> Facility {
        Facility {
            id,
            name: "Central".to_string(),
            location: "Downtown".to_string(),
            total_slots: 10,
            base_price_per_hour: dec!(20),
            created_at: Utc::now(),
        }
    }

    fn vehicle(id: Uuid) -> Vehicle {
        Vehicle {
            id,
            vehicle_number: "MH12AB1234".to_string(),
            vehicle_type: VehicleType::Car,
        }
    }

    struct Mocks {
        facilities: MockFacilityDirectory,
        vehicles: MockVehicleRegistry,
        slots: MockSlotAllocator,
        sessions: MockSessionLedger,
        pricing: MockPricingEngine,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                facilities: MockFacilityDirectory::new(),
                vehicles: MockVehicleRegistry::new(),
                slots: MockSlotAllocator::new(),
                sessions: MockSessionLedger::new(),
                pricing: MockPricingEngine::new(),
            }
        }

        fn into_service(self) -> ParkingOperationsService {
            ParkingOperationsService::new(
                Arc::new(self.facilities),
                Arc::new(self.vehicles),
                Arc::new(self.slots),
                Arc::new(self.sessions),
                Arc::new(self.pricing),
                None,
            )
        }
    }

    #[tokio::test]
    async fn entry_rolls_back_slot_when_session_create_loses_the_race() {
        let facility_id = Uuid::new_v4();
        let vehicle_id = Uuid::new_v4();
        let slot_id = Uuid::new_v4();

        let mut mocks = Mocks::new();
        mocks
            .facilities
            .expect_get()
            .with(eq(facility_id))
            .returning(move |_| Ok(facility(facility_id)));
        mocks
            .vehicles
            .expect_find_or_create()
            .returning(move |_, _| Ok((vehicle(vehicle_id), true)));
        mocks
            .sessions
            .expect_find_active()
            .returning(|_| Ok(None));
        mocks
            .slots
            .expect_allocate_first_available()
            .returning(move |_| {
                Ok(Slot {
                    id: slot_id,
                    facility_id,
                    slot_number: 1,
                    status: SlotStatus::Occupied,
                })
            });
        mocks.sessions.expect_create().returning(|_, _, _| {
            Err(ServiceError::Conflict(
                "Vehicle already has an active session".to_string(),
            ))
        });

        // The rollback path must release the slot and discard the vehicle.
        mocks
            .slots
            .expect_release()
            .with(eq(slot_id))
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .vehicles
            .expect_discard_registration()
            .with(eq(vehicle_id))
            .times(1)
            .returning(|_| Ok(()));

        let err = mocks
            .into_service()
            .enter_vehicle(EntryRequest {
                vehicle_number: "MH12AB1234".to_string(),
                vehicle_type: VehicleType::Car,
                facility_id,
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Conflict(_));
    }

    #[tokio::test]
    async fn entry_fails_fast_on_unknown_facility() {
        let facility_id = Uuid::new_v4();

        let mut mocks = Mocks::new();
        mocks
            .facilities
            .expect_get()
            .returning(|_| Err(ServiceError::NotFound("Parking facility not found".into())));
        // No other collaborator may be touched.
        mocks.vehicles.expect_find_or_create().times(0);
        mocks.slots.expect_allocate_first_available().times(0);

        let err = mocks
            .into_service()
            .enter_vehicle(EntryRequest {
                vehicle_number: "MH12AB1234".to_string(),
                vehicle_type: VehicleType::Car,
                facility_id,
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::NotFound(_));
    }

    #[tokio::test]
    async fn exit_reads_occupancy_before_releasing_the_slot() {
        let facility_id = Uuid::new_v4();
        let vehicle_id = Uuid::new_v4();
        let slot_id = Uuid::new_v4();
        let entry_time = Utc::now() - chrono::Duration::minutes(90);

        let session = Session {
            id: Uuid::new_v4(),
            vehicle_id,
            slot_id,
            facility_id,
            entry_time,
            exit_time: None,
            total_amount: None,
            status: SessionStatus::Active,
            version: 1,
        };

        let mut mocks = Mocks::new();
        mocks
            .vehicles
            .expect_find_by_number()
            .returning(move |_| Ok(Some(vehicle(vehicle_id))));
        let lookup = session.clone();
        mocks
            .sessions
            .expect_find_active()
            .returning(move |_| Ok(Some(lookup.clone())));
        mocks
            .facilities
            .expect_get()
            .returning(move |_| Ok(facility(facility_id)));

        // Occupancy is read with the departing slot still counted.
        mocks
            .slots
            .expect_count_by_status()
            .with(eq(facility_id), eq(SlotStatus::Occupied))
            .times(1..)
            .returning(|_, _| Ok(9));
        mocks
            .pricing
            .expect_calculate()
            .withf(|_, _, _, occupied, total| *occupied == 9 && *total == 10)
            .returning(|entry, exit, _, _, _| {
                Ok(Quote {
                    total_amount: dec!(30),
                    applied_multiplier: dec!(1.5),
                    billable_hours: 1,
                    duration_minutes: (exit - entry).num_minutes(),
                })
            });

        let ended = {
            let mut ended = session.clone();
            ended.status = SessionStatus::Completed;
            ended.total_amount = Some(dec!(30));
            ended.version = 2;
            ended
        };
        let ended_for_mock = ended.clone();
        mocks
            .sessions
            .expect_end()
            .returning(move |_, exit, _| {
                let mut s = ended_for_mock.clone();
                s.exit_time = Some(exit);
                Ok(s)
            });
        mocks
            .slots
            .expect_release()
            .with(eq(slot_id))
            .times(1)
            .returning(|_| Ok(()));

        let bill = mocks
            .into_service()
            .exit_vehicle(ExitRequest {
                vehicle_number: "MH12AB1234".to_string(),
                facility_id,
            })
            .await
            .unwrap();

        assert_eq!(bill.total_amount, dec!(30));
        assert_eq!(bill.applied_multiplier, dec!(1.5));
        assert_eq!(bill.billable_hours, 1);
        assert_eq!(bill.base_price_per_hour, dec!(20));
    }

    #[tokio::test]
    async fn exit_in_the_wrong_facility_is_a_conflict() {
        let vehicle_id = Uuid::new_v4();
        let session_facility = Uuid::new_v4();

        let mut mocks = Mocks::new();
        mocks
            .vehicles
            .expect_find_by_number()
            .returning(move |_| Ok(Some(vehicle(vehicle_id))));
        mocks.sessions.expect_find_active().returning(move |_| {
            Ok(Some(Session {
                id: Uuid::new_v4(),
                vehicle_id,
                slot_id: Uuid::new_v4(),
                facility_id: session_facility,
                entry_time: Utc::now(),
                exit_time: None,
                total_amount: None,
                status: SessionStatus::Active,
                version: 1,
            }))
        });
        // Nothing may be mutated.
        mocks.sessions.expect_end().times(0);
        mocks.slots.expect_release().times(0);

        let err = mocks
            .into_service()
            .exit_vehicle(ExitRequest {
                vehicle_number: "MH12AB1234".to_string(),
                facility_id: Uuid::new_v4(),
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Conflict(_));
    }

    #[tokio::test]
    async fn exit_without_active_session_is_not_found() {
        let mut mocks = Mocks::new();
        mocks
            .vehicles
            .expect_find_by_number()
            .returning(|_| Ok(Some(vehicle(Uuid::new_v4()))));
        mocks.sessions.expect_find_active().returning(|_| Ok(None));

        let err = mocks
            .into_service()
            .exit_vehicle(ExitRequest {
                vehicle_number: "MH12AB1234".to_string(),
                facility_id: Uuid::new_v4(),
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::NotFound(_));
    }
}
