//! Domain events emitted after successful entry, exit, and termination.
//!
//! Delivery is best-effort and fire-and-forget: the notification layer
//! (push fan-out, message bus) consumes these outside the core, and a
//! failed send must never fail the operation that produced the event.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::services::sessions::SessionView;

/// The notifications the core publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// A vehicle entered and a session went Active.
    SessionEntry {
        facility_id: Uuid,
        session: SessionView,
    },

    /// A session left Active, by normal exit or termination.
    SessionEnd {
        facility_id: Uuid,
        session: SessionView,
    },

    /// A facility's availability changed; carries the fresh counts so
    /// consumers need no read-back.
    SlotAvailabilityChanged {
        facility_id: Uuid,
        available_slots: i32,
        total_slots: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Handlers implementing this trait process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Drains the event channel and logs each notification. Embedders that
/// forward events to a real notification layer run their own consumer
/// instead.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::SessionEntry {
                facility_id,
                ref session,
            } => {
                info!(
                    facility_id = %facility_id,
                    session_id = %session.session_id,
                    vehicle_number = %session.vehicle_number,
                    "Session entry"
                );
            }
            Event::SessionEnd {
                facility_id,
                ref session,
            } => {
                info!(
                    facility_id = %facility_id,
                    session_id = %session.session_id,
                    status = %session.status,
                    "Session end"
                );
            }
            Event::SlotAvailabilityChanged {
                facility_id,
                available_slots,
                total_slots,
            } => {
                info!(
                    facility_id = %facility_id,
                    available_slots,
                    total_slots,
                    "Slot availability changed"
                );
                if available_slots == 0 {
                    warn!(facility_id = %facility_id, "Facility is full");
                }
            }
        }
    }

    warn!("Event processing loop has ended");
}
