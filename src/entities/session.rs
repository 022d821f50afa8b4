use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Completed,
    Terminated,
}

impl SessionStatus {
    /// Completed and Terminated sessions are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Terminated)
    }
}

/// One vehicle's timed occupancy of a slot, from entry to exit or
/// administrative termination.
///
/// Invariant: at most one Active session per vehicle at any instant.
/// `exit_time`, once set, is never before `entry_time`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,

    pub vehicle_id: Uuid,
    pub slot_id: Uuid,
    pub facility_id: Uuid,

    pub entry_time: DateTime<Utc>,

    /// Set when the session leaves Active.
    pub exit_time: Option<DateTime<Utc>>,

    /// Final charge; zero for terminated sessions. None while Active.
    pub total_amount: Option<Decimal>,

    pub status: SessionStatus,

    /// Optimistic concurrency counter, starts at 1 and increments on every
    /// state change. Updates must present the version they read.
    pub version: i32,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}
