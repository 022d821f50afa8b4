use config::{Config, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_EVENT_BUFFER_SIZE: usize = 128;
const CONFIG_DIR: &str = "config";

// The initial grace period: a session shorter than this is free of charge.
const DEFAULT_FREE_MINUTES: i64 = 30;

// Occupancy-tier ceilings (percent) and the multiplier each tier applies.
// Boundary values belong to the lower tier.
const DEFAULT_STANDARD_CEILING_PCT: i64 = 50;
const DEFAULT_MEDIUM_DEMAND_CEILING_PCT: i64 = 80;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Dynamic billing parameters.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    /// Minutes of free parking at the start of every session.
    #[serde(default = "default_free_minutes")]
    #[validate(range(min = 0))]
    pub free_minutes: i64,

    /// Multiplier while occupancy is at or below the standard ceiling.
    #[serde(default = "default_multiplier_standard")]
    pub multiplier_standard: Decimal,

    /// Multiplier between the standard and medium-demand ceilings.
    #[serde(default = "default_multiplier_medium_demand")]
    pub multiplier_medium_demand: Decimal,

    /// Multiplier above the medium-demand ceiling.
    #[serde(default = "default_multiplier_high_demand")]
    pub multiplier_high_demand: Decimal,

    /// Occupancy percentage up to which the standard multiplier applies.
    #[serde(default = "default_standard_ceiling_pct")]
    #[validate(range(min = 1, max = 100))]
    pub standard_ceiling_pct: i64,

    /// Occupancy percentage up to which the medium-demand multiplier
    /// applies; anything above is high demand.
    #[serde(default = "default_medium_demand_ceiling_pct")]
    #[validate(range(min = 1, max = 100))]
    pub medium_demand_ceiling_pct: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            free_minutes: default_free_minutes(),
            multiplier_standard: default_multiplier_standard(),
            multiplier_medium_demand: default_multiplier_medium_demand(),
            multiplier_high_demand: default_multiplier_high_demand(),
            standard_ceiling_pct: default_standard_ceiling_pct(),
            medium_demand_ceiling_pct: default_medium_demand_ceiling_pct(),
        }
    }
}

impl PricingConfig {
    /// Cross-field checks the derive cannot express.
    pub fn ensure_coherent(&self) -> Result<(), ConfigError> {
        if self.standard_ceiling_pct >= self.medium_demand_ceiling_pct {
            return Err(ConfigError::Invalid(format!(
                "standard ceiling ({}) must be below medium-demand ceiling ({})",
                self.standard_ceiling_pct, self.medium_demand_ceiling_pct
            )));
        }
        for (name, multiplier) in [
            ("multiplier_standard", self.multiplier_standard),
            ("multiplier_medium_demand", self.multiplier_medium_demand),
            ("multiplier_high_demand", self.multiplier_high_demand),
        ] {
            if multiplier <= Decimal::ZERO {
                return Err(ConfigError::Invalid(format!(
                    "{} must be positive, got {}",
                    name, multiplier
                )));
            }
        }
        Ok(())
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Capacity of the outbound domain-event channel.
    #[serde(default = "default_event_buffer_size")]
    #[validate(range(min = 1))]
    pub event_buffer_size: usize,

    /// Whether facility deletion keeps completed/terminated session
    /// records. `false` cascades history away with the facility.
    #[serde(default = "default_retain_history")]
    pub retain_history_on_delete: bool,

    /// Dynamic billing parameters.
    #[serde(default)]
    #[validate]
    pub pricing: PricingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            event_buffer_size: default_event_buffer_size(),
            retain_history_on_delete: default_retain_history(),
            pricing: PricingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `config/default`, an environment-specific
    /// overlay, and `PARKOPS__*` environment variables, in that order of
    /// precedence.
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            env::var("PARKOPS_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let default_path = Path::new(CONFIG_DIR).join("default");
        let env_path = Path::new(CONFIG_DIR).join(&environment);

        let loaded = Config::builder()
            .add_source(File::from(default_path).required(false))
            .add_source(File::from(env_path).required(false))
            .add_source(Environment::with_prefix("PARKOPS").separator("__"))
            .set_default("environment", environment.clone())?
            .build()?;

        let config: AppConfig = loaded.try_deserialize()?;
        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.pricing.ensure_coherent()?;

        info!(environment = %config.environment, "Configuration loaded");
        Ok(config)
    }
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_event_buffer_size() -> usize {
    DEFAULT_EVENT_BUFFER_SIZE
}

fn default_retain_history() -> bool {
    true
}

fn default_free_minutes() -> i64 {
    DEFAULT_FREE_MINUTES
}

fn default_multiplier_standard() -> Decimal {
    dec!(1.0)
}

fn default_multiplier_medium_demand() -> Decimal {
    dec!(1.25)
}

fn default_multiplier_high_demand() -> Decimal {
    dec!(1.5)
}

fn default_standard_ceiling_pct() -> i64 {
    DEFAULT_STANDARD_CEILING_PCT
}

fn default_medium_demand_ceiling_pct() -> i64 {
    DEFAULT_MEDIUM_DEMAND_CEILING_PCT
}
