//! Subscription store port.
//!
//! Defines the contract for reading subscribers and orders and for
//! persisting subscription changes. Implementations handle the actual
//! database operations.
//!
//! # Design
//!
//! - **Conditional writes**: every subscription write is a single atomic
//!   compare-and-set; nothing is written on a failed precondition
//! - **Applied marker**: the order's `subscription_applied_at` is set in the
//!   same write as the subscription it changed
//! - **Optimistic locking**: writes carry the subscriber `version` they read
//!
//! # Example
//!
//! ```ignore
//! let update = SubscriptionUpdate {
//!     user_id: subscriber.user_id.clone(),
//!     order_id: order.id.clone(),
//!     expected_version: subscriber.version,
//!     paid_at,
//!     new_state: outcome.state,
//!     applied_at: Timestamp::now(),
//! };
//! match store.apply_order(&update).await? {
//!     ApplyOutcome::Applied => { /* publish */ }
//!     ApplyOutcome::AlreadyApplied => { /* duplicate delivery */ }
//!     ApplyOutcome::Superseded => { /* recompute from history */ }
//!     ApplyOutcome::Conflict => { /* re-read and retry */ }
//! }
//! ```

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, OrderId, Timestamp, UserId};
use crate::domain::subscription::{PaidOrder, SubscriberAccount, SubscriptionState};

/// Incremental application of one paid order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub user_id: UserId,
    pub order_id: OrderId,

    /// Subscriber version the new state was computed from.
    pub expected_version: i64,

    /// Effective payment time of the order.
    pub paid_at: Timestamp,

    pub new_state: SubscriptionState,

    /// Value written to the order's applied marker.
    pub applied_at: Timestamp,
}

/// Wholesale replacement of a subscription from a historical recompute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionReplacement {
    pub user_id: UserId,
    pub expected_version: i64,
    pub new_state: SubscriptionState,
    pub last_applied_paid_at: Option<Timestamp>,

    /// Orders folded into `new_state`; their markers are set if still unset.
    pub folded_orders: Vec<OrderId>,

    pub applied_at: Timestamp,
}

/// Result of a conditional subscription write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The write happened.
    Applied,
    /// The order's marker was already set. Nothing was written.
    AlreadyApplied,
    /// A newer order is already applied for this user. Nothing was written.
    Superseded,
    /// The subscriber changed since it was read. Nothing was written.
    Conflict,
}

/// Store port for subscription accrual.
///
/// Implementations must ensure:
/// - `apply_order` and `replace_subscription` are atomic
/// - Preconditions are checked in the order: marker, ordering, version
/// - `version` increments on every successful write
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Find a subscriber by user ID.
    async fn find_subscriber(&self, user_id: &UserId) -> Result<Option<SubscriberAccount>, DomainError>;

    /// Insert a new subscriber.
    ///
    /// # Errors
    ///
    /// - `SubscriberExists` if the user is already registered
    async fn insert_subscriber(&self, subscriber: &SubscriberAccount) -> Result<(), DomainError>;

    /// Find an order by its ID.
    async fn find_order(&self, order_id: &OrderId) -> Result<Option<PaidOrder>, DomainError>;

    /// All orders of a user, in any status and any order.
    async fn list_orders_for_user(&self, user_id: &UserId) -> Result<Vec<PaidOrder>, DomainError>;

    /// Insert or overwrite an order record (used by order intake and tests).
    async fn upsert_order(&self, order: &PaidOrder) -> Result<(), DomainError>;

    /// Apply one paid order's subscription change, conditionally.
    async fn apply_order(&self, update: &SubscriptionUpdate) -> Result<ApplyOutcome, DomainError>;

    /// Replace the subscription with a recomputed state, conditionally on version.
    ///
    /// Returns `Applied` or `Conflict`.
    async fn replace_subscription(
        &self,
        replacement: &SubscriptionReplacement,
    ) -> Result<ApplyOutcome, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn SubscriptionStore) {}
    }
}
