//! Plan resolution for a paid order.
//!
//! Prefers the structured plan code. Falls back to the description
//! classifier for historical orders, and to the amount heuristic only when
//! the description says nothing and the policy allows it.

use serde::{Deserialize, Serialize};

use super::{PaidOrder, PlanType, SubscriptionError};

/// Where a resolved plan type came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    PlanCode,
    Description,
    AmountHeuristic,
}

/// Plan type resolved for an order, with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanResolution {
    pub plan: PlanType,
    pub source: PlanSource,
}

/// Knobs for the best-effort parts of plan resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationPolicy {
    /// Whether the amount/currency heuristic may be used at all.
    pub amount_fallback_enabled: bool,

    /// Minimum USD amount (minor units) classified as yearly.
    pub usd_yearly_threshold_minor: i64,

    /// Minimum amount in any other currency (minor units) classified as yearly.
    pub default_yearly_threshold_minor: i64,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self {
            amount_fallback_enabled: true,
            usd_yearly_threshold_minor: 10_000,
            default_yearly_threshold_minor: 50_000,
        }
    }
}

/// Resolves the plan type an order paid for.
///
/// # Errors
///
/// `ClassificationFailed` when no source yields a plan. The caller must not
/// change the subscription in that case.
pub fn resolve_plan(
    order: &PaidOrder,
    policy: &ClassificationPolicy,
) -> Result<PlanResolution, SubscriptionError> {
    if let Some(plan) = order.plan_code {
        return Ok(PlanResolution {
            plan,
            source: PlanSource::PlanCode,
        });
    }

    if let Some(plan) = PlanType::from_description(&order.plan_description) {
        return Ok(PlanResolution {
            plan,
            source: PlanSource::Description,
        });
    }

    if policy.amount_fallback_enabled {
        if let Some(plan) = PlanType::from_amount(
            order.amount_minor,
            &order.currency,
            policy.usd_yearly_threshold_minor,
            policy.default_yearly_threshold_minor,
        ) {
            tracing::warn!(
                order_id = %order.id,
                amount_minor = order.amount_minor,
                currency = %order.currency,
                plan = %plan,
                "Plan inferred from amount; description was empty or unrecognized"
            );
            return Ok(PlanResolution {
                plan,
                source: PlanSource::AmountHeuristic,
            });
        }
    }

    Err(SubscriptionError::classification_failed(
        order.id.clone(),
        order.plan_description.clone(),
    ))
}
