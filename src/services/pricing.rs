use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::PricingConfig;
use crate::errors::ServiceError;

/// Result of a billing calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub total_amount: Decimal,

    /// The occupancy multiplier in effect, reported even when the free
    /// window made the session cost nothing.
    pub applied_multiplier: Decimal,

    pub billable_hours: i64,

    pub duration_minutes: i64,
}

/// Pure bill calculation from duration and an occupancy reading.
///
/// The caller supplies `occupied_slots`; for a departing vehicle that read
/// is taken before its own slot is released, so the bill reflects the lot
/// as it stood during the session just ending.
#[cfg_attr(test, mockall::automock)]
pub trait PricingEngine: Send + Sync {
    fn calculate(
        &self,
        entry_time: DateTime<Utc>,
        exit_time: DateTime<Utc>,
        base_rate: Decimal,
        occupied_slots: i64,
        total_slots: i32,
    ) -> Result<Quote, ServiceError>;
}

/// Dynamic billing:
/// 1. The first `free_minutes` of a session are free.
/// 2. After that, every started hour is billed in full.
/// 3. A demand multiplier applies based on lot occupancy.
#[derive(Clone)]
pub struct BillingService {
    pricing: PricingConfig,
}

impl BillingService {
    pub fn new(pricing: PricingConfig) -> Self {
        Self { pricing }
    }

    /// Tier selection is exact: boundary occupancies (50%, 80% with the
    /// default ceilings) belong to the lower tier, with no float rounding
    /// involved in the comparison.
    fn occupancy_multiplier(&self, occupied_slots: i64, total_slots: i32) -> Decimal {
        let total = i64::from(total_slots);
        if occupied_slots * 100 <= self.pricing.standard_ceiling_pct * total {
            self.pricing.multiplier_standard
        } else if occupied_slots * 100 <= self.pricing.medium_demand_ceiling_pct * total {
            self.pricing.multiplier_medium_demand
        } else {
            self.pricing.multiplier_high_demand
        }
    }
}

impl PricingEngine for BillingService {
    #[instrument(skip(self))]
    fn calculate(
        &self,
        entry_time: DateTime<Utc>,
        exit_time: DateTime<Utc>,
        base_rate: Decimal,
        occupied_slots: i64,
        total_slots: i32,
    ) -> Result<Quote, ServiceError> {
        if exit_time < entry_time {
            return Err(ServiceError::InvalidInput(
                "Exit time cannot be before entry time".to_string(),
            ));
        }
        if total_slots <= 0 {
            return Err(ServiceError::InvalidConfiguration(format!(
                "Facility reports {} total slots; occupancy is undefined",
                total_slots
            )));
        }

        let duration_minutes = (exit_time - entry_time).num_minutes();
        let applied_multiplier = self.occupancy_multiplier(occupied_slots, total_slots);

        if duration_minutes <= self.pricing.free_minutes {
            return Ok(Quote {
                total_amount: Decimal::ZERO,
                applied_multiplier,
                billable_hours: 0,
                duration_minutes,
            });
        }

        let chargeable_minutes = duration_minutes - self.pricing.free_minutes;
        // Any started hour is billed in full: 61 chargeable minutes -> 2 hours.
        let billable_hours = (chargeable_minutes + 59) / 60;

        let total_amount = Decimal::from(billable_hours) * base_rate * applied_multiplier;

        Ok(Quote {
            total_amount,
            applied_multiplier,
            billable_hours,
            duration_minutes,
        })
    }
}
