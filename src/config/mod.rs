//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables use the `SUBSCRIPTION_ACCRUAL`
//! prefix and `__` between nesting levels.
//!
//! # Example
//!
//! ```no_run
//! use subscription_accrual::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Serving region {}", config.region);
//! ```

mod accrual;
mod database;
mod error;
mod logging;

pub use accrual::AccrualConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use logging::LoggingConfig;

use serde::Deserialize;

use crate::domain::subscription::Region;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Plan classification and write retries
    #[serde(default)]
    pub accrual: AccrualConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Region whose subscriber data this deployment owns
    #[serde(default)]
    pub region: Region,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `SUBSCRIPTION_ACCRUAL` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    ///
    /// # Environment Variable Format
    ///
    /// - `SUBSCRIPTION_ACCRUAL__DATABASE__URL=...` -> `database.url = ...`
    /// - `SUBSCRIPTION_ACCRUAL__ACCRUAL__MAX_APPLY_ATTEMPTS=5` -> `accrual.max_apply_attempts = 5`
    /// - `SUBSCRIPTION_ACCRUAL__REGION=china` -> `region = china`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("SUBSCRIPTION_ACCRUAL")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for the first invalid section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.accrual.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
