//! Expiry accrual evaluator.
//!
//! Pure function of (current subscription state, purchased plan, payment
//! time) to the new subscription state. It reads no clock and performs no
//! I/O; `now` is only used to report whether the result is current.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

use super::{PlanType, SubscriptionState};

/// How the new expiry was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccrualKind {
    /// Extended from a subscription still valid at payment time.
    Accrued,
    /// Started from the payment time: no prior subscription, or it had lapsed.
    Restarted,
}

/// Result of evaluating one paid order against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualOutcome {
    pub state: SubscriptionState,
    pub kind: AccrualKind,

    /// An active subscription of a different plan type was overwritten by
    /// this purchase's type while keeping its remaining days.
    pub plan_changed_while_active: bool,
}

impl AccrualOutcome {
    /// The new expiry. Always present after an evaluation.
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.state.expires_at
    }

    /// Returns true if the new state grants access at `now`.
    pub fn active_at(&self, now: Timestamp) -> bool {
        self.state.is_active(now)
    }
}

/// Applies one paid plan to the current subscription state.
///
/// If the current expiry is after `paid_at`, the plan period is added to that
/// expiry. Otherwise the period starts at `paid_at`. The subscription type
/// always becomes `plan`.
pub fn evaluate(current: &SubscriptionState, plan: PlanType, paid_at: Timestamp) -> AccrualOutcome {
    let active_expiry = current.expires_at.filter(|expires_at| *expires_at > paid_at);

    let (expires_at, kind) = match active_expiry {
        Some(expires_at) => (plan.period_end_from(expires_at), AccrualKind::Accrued),
        None => (plan.period_end_from(paid_at), AccrualKind::Restarted),
    };

    let plan_changed_while_active = active_expiry.is_some()
        && current
            .subscription_type
            .is_some_and(|previous| previous != plan);

    AccrualOutcome {
        state: SubscriptionState::new(Some(plan), Some(expires_at)),
        kind,
        plan_changed_while_active,
    }
}
