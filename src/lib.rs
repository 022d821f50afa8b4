//! Parkops Core Library
//!
//! This crate provides the operations core of a multi-facility parking
//! service: atomic vehicle entry/exit workflows, concurrency-safe slot
//! allocation, a session ledger with optimistic versioning, and
//! occupancy-sensitive dynamic billing. Transport, durable persistence,
//! and notification fan-out are external collaborators.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod services;
pub mod store;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::events::{Event, EventSender};
use crate::services::facilities::FacilityService;
use crate::services::operations::ParkingOperationsService;
use crate::services::pricing::BillingService;
use crate::services::sessions::SessionService;
use crate::services::slots::SlotService;
use crate::services::vehicles::VehicleService;
use crate::store::InMemoryStore;

/// Fully wired parking core.
///
/// Construction returns the receiving end of the domain-event channel;
/// embedders either spawn [`events::process_events`] on it or attach their
/// own consumer feeding the notification layer.
#[derive(Clone)]
pub struct ParkingCore {
    pub config: AppConfig,
    pub store: Arc<InMemoryStore>,
    pub event_sender: EventSender,
    pub vehicles: Arc<VehicleService>,
    pub slots: Arc<SlotService>,
    pub sessions: Arc<SessionService>,
    pub pricing: Arc<BillingService>,
    pub facilities: Arc<FacilityService>,
    pub operations: Arc<ParkingOperationsService>,
}

impl ParkingCore {
    pub fn new(config: AppConfig) -> (Self, mpsc::Receiver<Event>) {
        let store = Arc::new(InMemoryStore::new());
        let (tx, rx) = mpsc::channel(config.event_buffer_size);
        let event_sender = EventSender::new(tx);

        let vehicles = Arc::new(VehicleService::new(store.clone()));
        let slots = Arc::new(SlotService::new(store.clone()));
        let sessions = Arc::new(SessionService::new(store.clone()));
        let pricing = Arc::new(BillingService::new(config.pricing.clone()));
        let facilities = Arc::new(FacilityService::new(
            store.clone(),
            slots.clone(),
            config.retain_history_on_delete,
        ));

        let operations = Arc::new(ParkingOperationsService::new(
            facilities.clone(),
            vehicles.clone(),
            slots.clone(),
            sessions.clone(),
            pricing.clone(),
            Some(event_sender.clone()),
        ));

        let core = Self {
            config,
            store,
            event_sender,
            vehicles,
            slots,
            sessions,
            pricing,
            facilities,
            operations,
        };
        (core, rx)
    }

    pub fn operations(&self) -> Arc<ParkingOperationsService> {
        self.operations.clone()
    }

    pub fn facility_service(&self) -> Arc<FacilityService> {
        self.facilities.clone()
    }
}

pub mod prelude {
    pub use crate::config::{AppConfig, PricingConfig};
    pub use crate::entities::*;
    pub use crate::errors::ServiceError;
    pub use crate::events::{Event, EventHandler, EventSender};
    pub use crate::services::facilities::{FacilityDirectory, FacilityRequest, FacilityView};
    pub use crate::services::operations::{Bill, EntryRequest, ExitRequest, Ticket};
    pub use crate::services::pricing::{PricingEngine, Quote};
    pub use crate::services::sessions::{SessionLedger, SessionView};
    pub use crate::services::slots::SlotAllocator;
    pub use crate::services::vehicles::VehicleRegistry;
    pub use crate::ParkingCore;
}
