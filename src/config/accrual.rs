//! Accrual configuration: plan classification fallbacks and write retries.

use serde::Deserialize;

use crate::domain::subscription::ClassificationPolicy;

use super::error::ValidationError;

/// Accrual configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AccrualConfig {
    /// Allow classifying an order by amount when neither plan code nor
    /// description identifies the plan.
    #[serde(default = "default_amount_fallback_enabled")]
    pub amount_fallback_enabled: bool,

    /// USD amount in cents at or above which an order counts as yearly.
    #[serde(default = "default_usd_yearly_threshold_minor")]
    pub usd_yearly_threshold_minor: i64,

    /// Same threshold for every other currency, in minor units.
    #[serde(default = "default_default_yearly_threshold_minor")]
    pub default_yearly_threshold_minor: i64,

    /// Attempts at a conditional write before reporting a conflict.
    #[serde(default = "default_max_apply_attempts")]
    pub max_apply_attempts: u32,
}

impl AccrualConfig {
    /// Policy handed to the plan resolver.
    pub fn classification_policy(&self) -> ClassificationPolicy {
        ClassificationPolicy {
            amount_fallback_enabled: self.amount_fallback_enabled,
            usd_yearly_threshold_minor: self.usd_yearly_threshold_minor,
            default_yearly_threshold_minor: self.default_yearly_threshold_minor,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.usd_yearly_threshold_minor <= 0 {
            return Err(ValidationError::InvalidThreshold("usd_yearly_threshold_minor"));
        }
        if self.default_yearly_threshold_minor <= 0 {
            return Err(ValidationError::InvalidThreshold("default_yearly_threshold_minor"));
        }
        if !(1..=20).contains(&self.max_apply_attempts) {
            return Err(ValidationError::InvalidApplyAttempts);
        }
        Ok(())
    }
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            amount_fallback_enabled: default_amount_fallback_enabled(),
            usd_yearly_threshold_minor: default_usd_yearly_threshold_minor(),
            default_yearly_threshold_minor: default_default_yearly_threshold_minor(),
            max_apply_attempts: default_max_apply_attempts(),
        }
    }
}

fn default_amount_fallback_enabled() -> bool {
    true
}

fn default_usd_yearly_threshold_minor() -> i64 {
    10_000
}

fn default_default_yearly_threshold_minor() -> i64 {
    50_000
}

fn default_max_apply_attempts() -> u32 {
    3
}
