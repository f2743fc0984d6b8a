//! Paid order entity (the subset of an order relevant to subscription accrual).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{OrderId, Timestamp, UserId, ValidationError};

use super::PlanType;

/// Payment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" | "canceled" => Ok(PaymentStatus::Cancelled),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(ValidationError::invalid_format(
                "payment_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// An order as seen by the subscription accrual logic.
///
/// # Invariants
///
/// - `subscription_applied_at` is set exactly once, by the store, in the same
///   atomic write as the subscription update it caused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaidOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub payment_status: PaymentStatus,

    /// Structured plan code attached when the order was created.
    /// Historical orders predate it and only carry a description.
    pub plan_code: Option<PlanType>,

    /// Display text such as "Pro Plan - Pro Yearly".
    pub plan_description: String,

    /// Charged amount in minor units (cents, fen).
    pub amount_minor: i64,
    pub currency: String,

    pub paid_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    pub created_at: Option<Timestamp>,

    /// When this order's subscription days were applied to the user.
    pub subscription_applied_at: Option<Timestamp>,
}

impl PaidOrder {
    /// Creates an order that has just been paid, with the plan code known.
    pub fn paid(
        id: OrderId,
        user_id: UserId,
        plan_code: Option<PlanType>,
        plan_description: impl Into<String>,
        amount_minor: i64,
        currency: impl Into<String>,
        paid_at: Timestamp,
    ) -> Self {
        Self {
            id,
            user_id,
            payment_status: PaymentStatus::Paid,
            plan_code,
            plan_description: plan_description.into(),
            amount_minor,
            currency: currency.into(),
            paid_at: Some(paid_at),
            updated_at: Some(paid_at),
            created_at: Some(paid_at),
            subscription_applied_at: None,
        }
    }

    /// Returns true if the order's payment has been confirmed.
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// Returns true if this order's subscription has already been applied.
    pub fn is_applied(&self) -> bool {
        self.subscription_applied_at.is_some()
    }

    /// When the payment took effect: `paid_at`, else `updated_at`, else `created_at`.
    pub fn effective_paid_at(&self) -> Option<Timestamp> {
        self.paid_at.or(self.updated_at).or(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(value: &str) -> Timestamp {
        Timestamp::parse_rfc3339(value).unwrap()
    }

    fn order() -> PaidOrder {
        PaidOrder::paid(
            OrderId::new("ord_1").unwrap(),
            UserId::new("user-1").unwrap(),
            None,
            "Pro Plan - Pro Monthly",
            1_499,
            "USD",
            ts("2024-05-15T00:00:00Z"),
        )
    }

    #[test]
    fn paid_constructor_starts_unapplied() {
        let order = order();
        assert!(order.is_paid());
        assert!(!order.is_applied());
    }

    #[test]
    fn effective_paid_at_prefers_paid_at() {
        let mut order = order();
        order.updated_at = Some(ts("2024-06-01T00:00:00Z"));
        assert_eq!(order.effective_paid_at(), Some(ts("2024-05-15T00:00:00Z")));
    }

    #[test]
    fn effective_paid_at_falls_back_to_updated_then_created() {
        let mut order = order();
        order.paid_at = None;
        order.updated_at = Some(ts("2024-05-16T00:00:00Z"));
        order.created_at = Some(ts("2024-05-14T00:00:00Z"));
        assert_eq!(order.effective_paid_at(), Some(ts("2024-05-16T00:00:00Z")));

        order.updated_at = None;
        assert_eq!(order.effective_paid_at(), Some(ts("2024-05-14T00:00:00Z")));
    }

    #[test]
    fn effective_paid_at_is_none_without_any_timestamp() {
        let mut order = order();
        order.paid_at = None;
        order.updated_at = None;
        order.created_at = None;
        assert_eq!(order.effective_paid_at(), None);
    }

    #[test]
    fn payment_status_parses_both_spellings_of_cancelled() {
        assert_eq!("canceled".parse::<PaymentStatus>().unwrap(), PaymentStatus::Cancelled);
        assert_eq!("Cancelled".parse::<PaymentStatus>().unwrap(), PaymentStatus::Cancelled);
        assert!("chargeback".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn payment_status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&PaymentStatus::Paid).unwrap(), "\"paid\"");
    }
}
