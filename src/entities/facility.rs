use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A parking facility. Parent of its slots; capacity only ever grows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: Uuid,

    /// Globally unique display name.
    pub name: String,

    pub location: String,

    /// Total capacity. Slots are numbered 1..=total_slots, contiguously.
    pub total_slots: i32,

    pub base_price_per_hour: Decimal,

    pub created_at: DateTime<Utc>,
}
