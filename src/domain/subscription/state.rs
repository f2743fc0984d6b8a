//! Subscription state value object.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

use super::PlanType;

/// A user's subscription fields: plan type and expiry.
///
/// # Invariants
///
/// - A state without `expires_at` is inactive whatever `subscription_type`
///   says; a stored past type is not a grant of access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub subscription_type: Option<PlanType>,
    pub expires_at: Option<Timestamp>,
}

impl SubscriptionState {
    /// No current or past subscription.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(subscription_type: Option<PlanType>, expires_at: Option<Timestamp>) -> Self {
        Self {
            subscription_type,
            expires_at,
        }
    }

    /// Returns true if the subscription grants access at `now`.
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at > now)
    }

    /// The plan type, but only while the subscription is active.
    pub fn effective_type(&self, now: Timestamp) -> Option<PlanType> {
        if self.is_active(now) {
            self.subscription_type
        } else {
            None
        }
    }

    /// Days of access left at `now`, rounded up and never negative.
    pub fn days_remaining(&self, now: Timestamp) -> u32 {
        self.expires_at
            .map(|expires_at| expires_at.days_until_ceil(&now))
            .unwrap_or(0)
    }

    /// This state as it should be reported at `now`: expired history is cleared.
    pub fn current_at(&self, now: Timestamp) -> Self {
        if self.is_active(now) {
            *self
        } else {
            Self::none()
        }
    }
}
