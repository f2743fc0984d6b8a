//! Plan type definitions and the free-text plan classifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{Timestamp, ValidationError};

/// Days granted by one monthly purchase.
pub const MONTHLY_PERIOD_DAYS: i64 = 30;

/// Subscription plan purchased by an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    /// 30 days of access per purchase.
    Monthly,

    /// One calendar year of access per purchase.
    Yearly,
}

impl PlanType {
    /// Returns the expiry produced by starting (or extending) a period at `start`.
    ///
    /// Monthly adds 30 days. Yearly adds one calendar year, which is 365 days
    /// except across a February 29th.
    pub fn period_end_from(&self, start: Timestamp) -> Timestamp {
        match self {
            PlanType::Monthly => start.add_days(MONTHLY_PERIOD_DAYS),
            PlanType::Yearly => start.add_calendar_years(1),
        }
    }

    /// Returns the lowercase storage code for this plan.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Monthly => "monthly",
            PlanType::Yearly => "yearly",
        }
    }

    /// Classifies a human-readable plan description.
    ///
    /// Yearly markers are checked before monthly ones, so a description
    /// matching both classifies as yearly. Returns `None` when nothing matches.
    pub fn from_description(description: &str) -> Option<PlanType> {
        let text = description.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }

        if text.contains("pro yearly")
            || text.contains("pro-yearly")
            || text.contains("yearly")
            || text.contains("annual")
            || text.ends_with("yearly")
        {
            return Some(PlanType::Yearly);
        }

        if text.contains("pro monthly")
            || text.contains("pro-monthly")
            || text.contains("monthly")
            || text.ends_with("monthly")
        {
            return Some(PlanType::Monthly);
        }

        let mentions_year = text.contains("year");
        let mentions_month = text.contains("month");
        match (mentions_year, mentions_month) {
            (true, false) => Some(PlanType::Yearly),
            (false, true) => Some(PlanType::Monthly),
            _ => None,
        }
    }

    /// Infers the plan from the charged amount, in minor currency units.
    ///
    /// USD amounts at or above `usd_yearly_threshold_minor` are yearly. Any
    /// other currency is treated as CNY pricing and compared against
    /// `default_yearly_threshold_minor`. Non-positive amounts and blank
    /// currencies yield `None`.
    pub fn from_amount(
        amount_minor: i64,
        currency: &str,
        usd_yearly_threshold_minor: i64,
        default_yearly_threshold_minor: i64,
    ) -> Option<PlanType> {
        let currency = currency.trim();
        if amount_minor <= 0 || currency.is_empty() {
            return None;
        }

        let threshold = if currency.eq_ignore_ascii_case("usd") {
            usd_yearly_threshold_minor
        } else {
            default_yearly_threshold_minor
        };

        if amount_minor >= threshold {
            Some(PlanType::Yearly)
        } else {
            Some(PlanType::Monthly)
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "monthly" => Ok(PlanType::Monthly),
            "yearly" | "annual" => Ok(PlanType::Yearly),
            other => Err(ValidationError::invalid_format(
                "plan_code",
                format!("unknown plan '{}'", other),
            )),
        }
    }
}
