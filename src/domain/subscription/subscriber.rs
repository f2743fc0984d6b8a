//! Subscriber aggregate.
//!
//! A subscriber is the user entity restricted to what subscription accrual
//! reads and writes. Each user has at most one subscriber record.
//!
//! # Design Decisions
//!
//! - **Explicit region**: persisted at registration, never inferred
//! - **Optimistic locking**: `version` increments on every subscription write
//! - **Ordering guard**: `last_applied_paid_at` records the newest applied order

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId};

use super::{Region, SubscriptionState};

/// Subscriber aggregate.
///
/// # Invariants
///
/// - `user_id` is unique
/// - `region` never changes after registration
/// - `version` strictly increases with each persisted subscription change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberAccount {
    pub user_id: UserId,
    pub region: Region,
    pub state: SubscriptionState,

    /// Effective payment time of the newest order applied to `state`.
    pub last_applied_paid_at: Option<Timestamp>,

    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SubscriberAccount {
    /// Registers a subscriber with no subscription history.
    pub fn register(user_id: UserId, region: Region, now: Timestamp) -> Self {
        Self {
            user_id,
            region,
            state: SubscriptionState::none(),
            last_applied_paid_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if an order paid at `paid_at` predates one already applied.
    ///
    /// Applying such an order incrementally would accrue against the wrong
    /// baseline; it has to go through a historical recompute instead.
    pub fn is_superseded_by_applied(&self, paid_at: Timestamp) -> bool {
        self.last_applied_paid_at
            .is_some_and(|last_applied| last_applied > paid_at)
    }
}
