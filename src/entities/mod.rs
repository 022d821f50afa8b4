//! Domain records for the parking core.
//!
//! These are plain in-process records: the durable persistence engine is an
//! external collaborator, so nothing here carries ORM machinery. Relations
//! are explicit foreign-key fields; no record is reachable through another.

pub mod facility;
pub mod session;
pub mod slot;
pub mod vehicle;

pub use facility::Facility;
pub use session::{Session, SessionStatus};
pub use slot::{Slot, SlotStatus};
pub use vehicle::{Vehicle, VehicleType};
