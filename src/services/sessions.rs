use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{Session, SessionStatus, SlotStatus, VehicleType};
use crate::errors::ServiceError;
use crate::store::InMemoryStore;

/// Read model for session listings and events.
///
/// `facility_name` and `slot_number` are optional because history can
/// outlive its facility when deletion is configured to retain records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub vehicle_number: String,
    pub vehicle_type: VehicleType,
    pub facility_id: Uuid,
    pub facility_name: Option<String>,
    pub slot_number: Option<i32>,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub total_amount: Option<Decimal>,
    pub status: SessionStatus,
}

/// The ledger of parking sessions.
///
/// Closure operations use optimistic versioning: callers present the
/// session as they read it, and a version mismatch fails with
/// `ConcurrentModification` so the loser of a double-exit race can retry
/// against fresh state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionLedger: Send + Sync {
    async fn find_active(&self, vehicle_id: Uuid) -> Result<Option<Session>, ServiceError>;

    async fn get(&self, session_id: Uuid) -> Result<Option<Session>, ServiceError>;

    /// Opens an Active session and atomically claims the vehicle's
    /// one-active-session slot. Losing that claim is a `Conflict`.
    async fn create(
        &self,
        vehicle_id: Uuid,
        slot_id: Uuid,
        facility_id: Uuid,
    ) -> Result<Session, ServiceError>;

    /// Active -> Completed with the final amount, under a version CAS.
    async fn end(
        &self,
        session: &Session,
        exit_time: DateTime<Utc>,
        total_amount: Decimal,
    ) -> Result<Session, ServiceError>;

    /// Administrative override: Active -> Terminated, amount forced to
    /// zero, and the underlying slot released as a documented side effect.
    /// `NotFound` if the session does not exist or is not Active.
    async fn terminate(&self, session_id: Uuid) -> Result<Session, ServiceError>;

    /// Assembles the read model for a session.
    async fn view(&self, session: &Session) -> Result<SessionView, ServiceError>;

    async fn list_active(
        &self,
        facility_id: Option<Uuid>,
    ) -> Result<Vec<SessionView>, ServiceError>;

    async fn list_all(
        &self,
        facility_id: Option<Uuid>,
    ) -> Result<Vec<SessionView>, ServiceError>;
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<InMemoryStore>,
}

impl SessionService {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }

    fn build_view(&self, session: &Session) -> Result<SessionView, ServiceError> {
        let vehicle = self.store.get_vehicle(session.vehicle_id).ok_or_else(|| {
            ServiceError::InternalError(format!(
                "Session {} references missing vehicle {}",
                session.id, session.vehicle_id
            ))
        })?;

        let facility_name = self
            .store
            .get_facility(session.facility_id)
            .map(|f| f.name);
        let slot_number = self.store.get_slot(session.slot_id).map(|s| s.slot_number);

        Ok(SessionView {
            session_id: session.id,
            vehicle_number: vehicle.vehicle_number,
            vehicle_type: vehicle.vehicle_type,
            facility_id: session.facility_id,
            facility_name,
            slot_number,
            entry_time: session.entry_time,
            exit_time: session.exit_time,
            total_amount: session.total_amount,
            status: session.status,
        })
    }

    fn views_for(&self, sessions: Vec<Session>) -> Result<Vec<SessionView>, ServiceError> {
        sessions.iter().map(|s| self.build_view(s)).collect()
    }
}

#[async_trait]
impl SessionLedger for SessionService {
    async fn find_active(&self, vehicle_id: Uuid) -> Result<Option<Session>, ServiceError> {
        Ok(self.store.active_session_of(vehicle_id))
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<Session>, ServiceError> {
        Ok(self.store.get_session(session_id))
    }

    #[instrument(skip(self))]
    async fn create(
        &self,
        vehicle_id: Uuid,
        slot_id: Uuid,
        facility_id: Uuid,
    ) -> Result<Session, ServiceError> {
        let session = Session {
            id: Uuid::new_v4(),
            vehicle_id,
            slot_id,
            facility_id,
            entry_time: Utc::now(),
            exit_time: None,
            total_amount: None,
            status: SessionStatus::Active,
            version: 1,
        };

        if !self.store.claim_active_session(vehicle_id, session.id) {
            return Err(ServiceError::Conflict(
                "Vehicle already has an active session".to_string(),
            ));
        }
        self.store.insert_session(session.clone());

        info!(
            session_id = %session.id,
            vehicle_id = %vehicle_id,
            facility_id = %facility_id,
            "Session started"
        );
        Ok(session)
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    async fn end(
        &self,
        session: &Session,
        exit_time: DateTime<Utc>,
        total_amount: Decimal,
    ) -> Result<Session, ServiceError> {
        let ended = self
            .store
            .with_session_mut(session.id, |current| {
                if current.version != session.version {
                    return Err(ServiceError::ConcurrentModification(current.id));
                }
                if !current.is_active() {
                    return Err(ServiceError::Conflict(format!(
                        "Session is {} and cannot be completed",
                        current.status
                    )));
                }
                if exit_time < current.entry_time {
                    return Err(ServiceError::InvalidInput(
                        "Exit time cannot be before entry time".to_string(),
                    ));
                }
                current.exit_time = Some(exit_time);
                current.total_amount = Some(total_amount);
                current.status = SessionStatus::Completed;
                current.version += 1;
                Ok(current.clone())
            })
            .ok_or_else(|| ServiceError::NotFound("Session not found".to_string()))??;

        self.store.release_active_session(ended.vehicle_id, ended.id);

        info!(
            session_id = %ended.id,
            total_amount = %total_amount,
            "Session completed"
        );
        Ok(ended)
    }

    #[instrument(skip(self))]
    async fn terminate(&self, session_id: Uuid) -> Result<Session, ServiceError> {
        let snapshot = self.store.get_session(session_id).ok_or_else(|| {
            ServiceError::NotFound("No session found with this session id".to_string())
        })?;
        if !snapshot.is_active() {
            return Err(ServiceError::NotFound(
                "Session is not active and cannot be terminated".to_string(),
            ));
        }

        let terminated = self
            .store
            .with_session_mut(session_id, |current| {
                if current.version != snapshot.version {
                    return Err(ServiceError::ConcurrentModification(current.id));
                }
                if !current.is_active() {
                    return Err(ServiceError::NotFound(
                        "Session is not active and cannot be terminated".to_string(),
                    ));
                }
                current.exit_time = Some(Utc::now());
                current.total_amount = Some(Decimal::ZERO);
                current.status = SessionStatus::Terminated;
                current.version += 1;
                Ok(current.clone())
            })
            .ok_or_else(|| {
                ServiceError::NotFound("No session found with this session id".to_string())
            })??;

        self.store
            .release_active_session(terminated.vehicle_id, terminated.id);

        // Documented side effect: the slot is freed immediately.
        if self
            .store
            .with_slot_mut(terminated.slot_id, |slot| {
                slot.status = SlotStatus::Available
            })
            .is_none()
        {
            warn!(
                session_id = %session_id,
                slot_id = %terminated.slot_id,
                "Terminated session references a missing slot"
            );
        }

        info!(session_id = %session_id, "Session terminated");
        Ok(terminated)
    }

    async fn view(&self, session: &Session) -> Result<SessionView, ServiceError> {
        self.build_view(session)
    }

    async fn list_active(
        &self,
        facility_id: Option<Uuid>,
    ) -> Result<Vec<SessionView>, ServiceError> {
        let sessions = self
            .store
            .sessions_snapshot(facility_id, |s| s.is_active());
        self.views_for(sessions)
    }

    async fn list_all(
        &self,
        facility_id: Option<Uuid>,
    ) -> Result<Vec<SessionView>, ServiceError> {
        let sessions = self.store.sessions_snapshot(facility_id, |_| true);
        self.views_for(sessions)
    }
}
