#![allow(dead_code)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use uuid::Uuid;

use parkops::config::AppConfig;
use parkops::entities::VehicleType;
use parkops::errors::ServiceError;
use parkops::events::{process_events, Event};
use parkops::services::facilities::{FacilityRequest, FacilityView};
use parkops::services::operations::{Bill, EntryRequest, ExitRequest, Ticket};
use parkops::ParkingCore;

/// Test harness wiring a fresh core with a drained event channel.
pub struct TestCore {
    pub core: ParkingCore,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestCore {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let (core, rx) = ParkingCore::new(config);
        let event_task = tokio::spawn(process_events(rx));
        Self {
            core,
            _event_task: event_task,
        }
    }

    /// Variant keeping the event receiver for assertions on emitted events.
    pub fn with_captured_events() -> (ParkingCore, mpsc::Receiver<Event>) {
        ParkingCore::new(AppConfig::default())
    }

    pub async fn create_facility(&self, name: &str, total_slots: i32) -> FacilityView {
        self.create_facility_priced(name, total_slots, dec!(20)).await
    }

    pub async fn create_facility_priced(
        &self,
        name: &str,
        total_slots: i32,
        base_price_per_hour: Decimal,
    ) -> FacilityView {
        self.core
            .facilities
            .create_facility(FacilityRequest {
                name: name.to_string(),
                location: "Test City".to_string(),
                total_slots,
                base_price_per_hour,
            })
            .await
            .expect("facility creation succeeds")
    }

    pub async fn enter(
        &self,
        vehicle_number: &str,
        facility_id: Uuid,
    ) -> Result<Ticket, ServiceError> {
        self.core
            .operations
            .enter_vehicle(EntryRequest {
                vehicle_number: vehicle_number.to_string(),
                vehicle_type: VehicleType::Car,
                facility_id,
            })
            .await
    }

    pub async fn exit(
        &self,
        vehicle_number: &str,
        facility_id: Uuid,
    ) -> Result<Bill, ServiceError> {
        self.core
            .operations
            .exit_vehicle(ExitRequest {
                vehicle_number: vehicle_number.to_string(),
                facility_id,
            })
            .await
    }

    /// Shifts a session's entry time into the past so billing tests can
    /// exercise durations beyond the free window.
    pub fn backdate_entry(&self, session_id: Uuid, minutes: i64) {
        self.core
            .store
            .with_session_mut(session_id, |session| {
                session.entry_time -= chrono::Duration::minutes(minutes);
            })
            .expect("session exists");
    }
}
