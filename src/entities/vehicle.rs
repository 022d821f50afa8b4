use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    Car,
    Bike,
}

/// A registered vehicle. Created once on first entry and reused across
/// sessions. The type is fixed at registration; a later entry under a
/// different type is rejected rather than overwritten.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,

    /// Normalized plate number: non-alphanumerics stripped, upper-cased.
    /// Globally unique.
    pub vehicle_number: String,

    pub vehicle_type: VehicleType,
}
