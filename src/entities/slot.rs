use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Available,
    Occupied,
}

/// One physical parking space, uniquely numbered within its facility.
///
/// Slots are created when their facility is created (or expanded) and only
/// removed when the facility is deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub facility_id: Uuid,
    pub slot_number: i32,
    pub status: SlotStatus,
}
