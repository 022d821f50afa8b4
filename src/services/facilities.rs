use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{Facility, SlotStatus};
use crate::errors::ServiceError;
use crate::services::slots::SlotAllocator;
use crate::store::InMemoryStore;

/// Payload for facility creation and update.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FacilityRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    #[validate(length(
        min = 1,
        max = 200,
        message = "Location must be between 1 and 200 characters"
    ))]
    pub location: String,

    #[validate(range(min = 1, message = "A facility needs at least one slot"))]
    pub total_slots: i32,

    pub base_price_per_hour: Decimal,
}

impl FacilityRequest {
    fn check(&self) -> Result<(), ServiceError> {
        self.validate()?;
        if self.base_price_per_hour <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Base price per hour must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityView {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub total_slots: i32,
    /// Counted dynamically at read time; momentarily stale under load.
    pub available_slots: i32,
    pub base_price_per_hour: Decimal,
    pub created_at: DateTime<Utc>,
}

/// The facility lookup the coordinator depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FacilityDirectory: Send + Sync {
    async fn get(&self, facility_id: Uuid) -> Result<Facility, ServiceError>;
}

/// Facility lifecycle: creation with slot generation, grow-only capacity
/// updates, and guarded deletion.
#[derive(Clone)]
pub struct FacilityService {
    store: Arc<InMemoryStore>,
    slots: Arc<dyn SlotAllocator>,
    /// Whether deletion keeps completed/terminated session history.
    retain_history_on_delete: bool,
}

impl FacilityService {
    pub fn new(
        store: Arc<InMemoryStore>,
        slots: Arc<dyn SlotAllocator>,
        retain_history_on_delete: bool,
    ) -> Self {
        Self {
            store,
            slots,
            retain_history_on_delete,
        }
    }

    fn view(&self, facility: Facility) -> FacilityView {
        let available = self
            .store
            .count_slots(facility.id, SlotStatus::Available) as i32;
        FacilityView {
            id: facility.id,
            name: facility.name,
            location: facility.location,
            total_slots: facility.total_slots,
            available_slots: available,
            base_price_per_hour: facility.base_price_per_hour,
            created_at: facility.created_at,
        }
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_facility(
        &self,
        request: FacilityRequest,
    ) -> Result<FacilityView, ServiceError> {
        request.check()?;

        let facility = Facility {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            location: request.location,
            total_slots: request.total_slots,
            base_price_per_hour: request.base_price_per_hour,
            created_at: Utc::now(),
        };

        if !self.store.claim_facility_name(&facility.name, facility.id) {
            return Err(ServiceError::Conflict(format!(
                "Facility name '{}' is already in use",
                facility.name
            )));
        }
        self.store.put_facility(facility.clone());

        // Facility and slots stand or fall together.
        if let Err(e) = self
            .slots
            .create_slots(facility.id, 1, facility.total_slots)
            .await
        {
            warn!(facility_id = %facility.id, error = %e, "Slot generation failed, rolling back facility");
            self.store.remove_facility(facility.id);
            return Err(e);
        }

        info!(
            facility_id = %facility.id,
            total_slots = facility.total_slots,
            "Facility created"
        );
        Ok(self.view(facility))
    }

    #[instrument(skip(self))]
    pub async fn get_facility(&self, facility_id: Uuid) -> Result<FacilityView, ServiceError> {
        let facility = self.store.get_facility(facility_id).ok_or_else(|| {
            ServiceError::NotFound(format!("Parking facility not found by id {}", facility_id))
        })?;
        Ok(self.view(facility))
    }

    pub async fn list_facilities(&self) -> Result<Vec<FacilityView>, ServiceError> {
        Ok(self
            .store
            .list_facilities()
            .into_iter()
            .map(|f| self.view(f))
            .collect())
    }

    /// Capacity can only grow: expansion appends slots above the current
    /// numbering; existing slots are never renumbered or removed.
    #[instrument(skip(self, request), fields(facility_id = %facility_id))]
    pub async fn update_facility(
        &self,
        facility_id: Uuid,
        request: FacilityRequest,
    ) -> Result<FacilityView, ServiceError> {
        request.check()?;

        // Serialize against allocation and other updates on this facility.
        let lock = self.store.allocation_lock(facility_id);
        let _guard = lock.lock().await;

        let current = self
            .store
            .get_facility(facility_id)
            .ok_or_else(|| ServiceError::NotFound("Parking facility not found".to_string()))?;

        if request.total_slots < current.total_slots {
            return Err(ServiceError::Conflict(
                "Lot size cannot be reduced".to_string(),
            ));
        }

        let renamed = request.name != current.name;
        if renamed && !self.store.claim_facility_name(&request.name, facility_id) {
            return Err(ServiceError::Conflict(format!(
                "Facility name '{}' is already in use",
                request.name
            )));
        }

        if request.total_slots > current.total_slots {
            if let Err(e) = self
                .slots
                .create_slots(facility_id, current.total_slots + 1, request.total_slots)
                .await
            {
                if renamed {
                    self.store.release_facility_name(&request.name);
                }
                return Err(e);
            }
            info!(
                facility_id = %facility_id,
                from = current.total_slots,
                to = request.total_slots,
                "Facility expanded"
            );
        }

        if renamed {
            self.store.release_facility_name(&current.name);
        }

        let updated = Facility {
            name: request.name,
            location: request.location,
            total_slots: request.total_slots,
            base_price_per_hour: request.base_price_per_hour,
            ..current
        };
        self.store.put_facility(updated.clone());

        Ok(self.view(updated))
    }

    /// Deletion is refused while any session is Active. Slots always go
    /// with the facility; session history survives unless configured to
    /// cascade.
    #[instrument(skip(self))]
    pub async fn delete_facility(&self, facility_id: Uuid) -> Result<(), ServiceError> {
        // Hold the allocation lock so no in-flight entry can occupy a slot
        // of a facility being deleted.
        let lock = self.store.allocation_lock(facility_id);
        let _guard = lock.lock().await;

        if self.store.get_facility(facility_id).is_none() {
            return Err(ServiceError::NotFound(
                "Parking facility not found".to_string(),
            ));
        }

        let occupied = self.store.count_slots(facility_id, SlotStatus::Occupied);
        if occupied > 0 || self.store.facility_has_active_sessions(facility_id) {
            return Err(ServiceError::Conflict(
                "Facility has active parking sessions and cannot be deleted".to_string(),
            ));
        }

        if !self.retain_history_on_delete {
            self.store.remove_facility_sessions(facility_id);
        }
        self.store.remove_facility(facility_id);

        info!(
            facility_id = %facility_id,
            retained_history = self.retain_history_on_delete,
            "Facility deleted"
        );
        Ok(())
    }
}

#[async_trait]
impl FacilityDirectory for FacilityService {
    async fn get(&self, facility_id: Uuid) -> Result<Facility, ServiceError> {
        self.store
            .get_facility(facility_id)
            .ok_or_else(|| ServiceError::NotFound("Parking facility not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    use crate::services::slots::SlotService;

    fn service(retain_history: bool) -> FacilityService {
        let store = Arc::new(InMemoryStore::new());
        let slots = Arc::new(SlotService::new(store.clone()));
        FacilityService::new(store, slots, retain_history)
    }

    fn request(name: &str, total_slots: i32) -> FacilityRequest {
        FacilityRequest {
            name: name.to_string(),
            location: "Sector 7".to_string(),
            total_slots,
            base_price_per_hour: dec!(20),
        }
    }

    #[tokio::test]
    async fn creation_generates_all_slots_available() {
        let svc = service(true);
        let view = svc.create_facility(request("Central", 10)).await.unwrap();
        assert_eq!(view.total_slots, 10);
        assert_eq!(view.available_slots, 10);
    }

    #[tokio::test]
    async fn duplicate_name_is_a_conflict() {
        let svc = service(true);
        svc.create_facility(request("Central", 5)).await.unwrap();
        let err = svc
            .create_facility(request("Central", 3))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Conflict(_));
    }

    #[tokio::test]
    async fn zero_slots_fails_validation() {
        let svc = service(true);
        let err = svc.create_facility(request("Tiny", 0)).await.unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    #[tokio::test]
    async fn non_positive_price_fails_validation() {
        let svc = service(true);
        let mut req = request("Freebie", 5);
        req.base_price_per_hour = Decimal::ZERO;
        let err = svc.create_facility(req).await.unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    #[tokio::test]
    async fn reduction_is_refused_expansion_appends() {
        let svc = service(true);
        let view = svc.create_facility(request("Growing", 5)).await.unwrap();

        let err = svc
            .update_facility(view.id, request("Growing", 3))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Conflict(_));

        let expanded = svc
            .update_facility(view.id, request("Growing", 8))
            .await
            .unwrap();
        assert_eq!(expanded.total_slots, 8);
        assert_eq!(expanded.available_slots, 8);
    }

    #[tokio::test]
    async fn rename_keeps_uniqueness() {
        let svc = service(true);
        svc.create_facility(request("North", 2)).await.unwrap();
        let south = svc.create_facility(request("South", 2)).await.unwrap();

        let err = svc
            .update_facility(south.id, request("North", 2))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Conflict(_));

        // The failed rename must not have released "South".
        let err = svc
            .create_facility(request("South", 1))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Conflict(_));
    }

    #[tokio::test]
    async fn delete_missing_facility_is_not_found() {
        let svc = service(true);
        let err = svc.delete_facility(Uuid::new_v4()).await.unwrap_err();
        assert_matches!(err, ServiceError::NotFound(_));
    }
}
