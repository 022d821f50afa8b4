use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{Vehicle, VehicleType};
use crate::errors::ServiceError;
use crate::store::InMemoryStore;

/// Normalizes a license plate number so formatting differences cannot
/// create duplicate registrations. "mh-12 ab 1234" becomes "MH12AB1234".
pub fn normalize_vehicle_number(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Registry of known vehicles. A vehicle is registered once and reused
/// across sessions; its type never changes after registration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VehicleRegistry: Send + Sync {
    /// Returns the registered vehicle for the plate, creating it on first
    /// sight. The boolean reports whether this call created the record,
    /// which the coordinator needs for rollback.
    async fn find_or_create(
        &self,
        vehicle_number: &str,
        vehicle_type: VehicleType,
    ) -> Result<(Vehicle, bool), ServiceError>;

    async fn find_by_number(
        &self,
        vehicle_number: &str,
    ) -> Result<Option<Vehicle>, ServiceError>;

    /// Compensating removal of a registration created by an entry that
    /// failed afterwards. A no-op if the vehicle has an active session.
    async fn discard_registration(&self, vehicle_id: Uuid) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct VehicleService {
    store: Arc<InMemoryStore>,
}

impl VehicleService {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }

    fn ensure_type_matches(
        existing: &Vehicle,
        requested: VehicleType,
    ) -> Result<(), ServiceError> {
        if existing.vehicle_type != requested {
            return Err(ServiceError::Conflict(format!(
                "Vehicle {} is registered as {}. Cannot process as {}",
                existing.vehicle_number, existing.vehicle_type, requested
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VehicleRegistry for VehicleService {
    #[instrument(skip(self))]
    async fn find_or_create(
        &self,
        vehicle_number: &str,
        vehicle_type: VehicleType,
    ) -> Result<(Vehicle, bool), ServiceError> {
        let normalized = normalize_vehicle_number(vehicle_number);
        if normalized.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Vehicle number must contain at least one alphanumeric character".to_string(),
            ));
        }

        if let Some(existing) = self.store.get_vehicle_by_number(&normalized) {
            Self::ensure_type_matches(&existing, vehicle_type)?;
            return Ok((existing, false));
        }

        let candidate = Vehicle {
            id: Uuid::new_v4(),
            vehicle_number: normalized,
            vehicle_type,
        };

        // The store resolves a concurrent registration of the same plate
        // to a single record; the loser gets the winner's back.
        match self.store.insert_vehicle(candidate) {
            Ok(created) => {
                info!(
                    vehicle_id = %created.id,
                    vehicle_number = %created.vehicle_number,
                    "Vehicle registered"
                );
                Ok((created, true))
            }
            Err(existing) => {
                Self::ensure_type_matches(&existing, vehicle_type)?;
                Ok((existing, false))
            }
        }
    }

    #[instrument(skip(self))]
    async fn find_by_number(
        &self,
        vehicle_number: &str,
    ) -> Result<Option<Vehicle>, ServiceError> {
        let normalized = normalize_vehicle_number(vehicle_number);
        if normalized.is_empty() {
            return Ok(None);
        }
        Ok(self.store.get_vehicle_by_number(&normalized))
    }

    #[instrument(skip(self))]
    async fn discard_registration(&self, vehicle_id: Uuid) -> Result<(), ServiceError> {
        if self.store.remove_vehicle_if_inactive(vehicle_id) {
            info!(vehicle_id = %vehicle_id, "Vehicle registration rolled back");
        }
        Ok(())
    }
}
