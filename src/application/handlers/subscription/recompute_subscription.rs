//! RecomputeSubscriptionHandler - Command handler that rebuilds a subscription
//! from the user's full order history.
//!
//! Used for reconciliation and as the fallback when an order is confirmed
//! after a newer one was already applied.

use std::sync::Arc;

use crate::domain::foundation::{EventId, OrderId, Timestamp, UserId};
use crate::domain::subscription::{
    recompute_from_history, ClassificationPolicy, SubscriptionError, SubscriptionEvent,
    SubscriptionState,
};
use crate::ports::{ApplyOutcome, EventPublisher, SubscriptionReplacement, SubscriptionStore};

use super::{publish_event, DEFAULT_MAX_APPLY_ATTEMPTS};

/// Command to recompute a user's subscription.
#[derive(Debug, Clone)]
pub struct RecomputeSubscriptionCommand {
    pub user_id: UserId,
    /// Instant the expiry check is made against.
    pub as_of: Timestamp,
}

impl RecomputeSubscriptionCommand {
    /// Recompute as of now.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            as_of: Timestamp::now(),
        }
    }
}

/// Result of a successful recompute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeSubscriptionResult {
    pub user_id: UserId,
    /// State as reported at `as_of`; cleared if the folded expiry had passed.
    /// The stored subscription keeps the folded expiry so later orders accrue
    /// against it.
    pub state: SubscriptionState,
    pub folded_orders: Vec<OrderId>,
    pub skipped_orders: Vec<OrderId>,
    pub last_paid_at: Option<Timestamp>,
}

/// Handler for recomputing subscriptions from order history.
pub struct RecomputeSubscriptionHandler {
    store: Arc<dyn SubscriptionStore>,
    event_publisher: Arc<dyn EventPublisher>,
    policy: ClassificationPolicy,
    max_attempts: u32,
}

impl RecomputeSubscriptionHandler {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        event_publisher: Arc<dyn EventPublisher>,
        policy: ClassificationPolicy,
    ) -> Self {
        Self {
            store,
            event_publisher,
            policy,
            max_attempts: DEFAULT_MAX_APPLY_ATTEMPTS,
        }
    }

    /// Sets how many times a version conflict is retried.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub async fn handle(
        &self,
        cmd: RecomputeSubscriptionCommand,
    ) -> Result<RecomputeSubscriptionResult, SubscriptionError> {
        for attempt in 1..=self.max_attempts {
            // 1. Read the subscriber and its whole history
            let subscriber = self
                .store
                .find_subscriber(&cmd.user_id)
                .await?
                .ok_or_else(|| SubscriptionError::subscriber_not_found(cmd.user_id.clone()))?;
            let orders = self.store.list_orders_for_user(&cmd.user_id).await?;

            // 2. Fold oldest to newest
            let status = recompute_from_history(&orders, &self.policy, cmd.as_of)?;

            // 3. Replace, guarded by the version we read
            let replacement = SubscriptionReplacement {
                user_id: cmd.user_id.clone(),
                expected_version: subscriber.version,
                new_state: status.folded_state,
                last_applied_paid_at: status.last_paid_at,
                folded_orders: status.folded_orders.clone(),
                applied_at: cmd.as_of,
            };

            match self.store.replace_subscription(&replacement).await? {
                ApplyOutcome::Applied => {
                    tracing::info!(
                        user_id = %cmd.user_id,
                        folded = status.folded_orders.len(),
                        skipped = status.skipped_orders.len(),
                        expires_at = ?status.state.expires_at,
                        "Subscription recomputed from history"
                    );

                    let event = SubscriptionEvent::Recomputed {
                        event_id: EventId::new(),
                        user_id: cmd.user_id.clone(),
                        subscription_type: status.state.subscription_type,
                        expires_at: status.state.expires_at,
                        folded_orders: status.folded_orders.len(),
                        skipped_orders: status.skipped_orders.len(),
                        occurred_at: cmd.as_of,
                    };
                    publish_event(self.event_publisher.as_ref(), &event, None).await;

                    return Ok(RecomputeSubscriptionResult {
                        user_id: cmd.user_id,
                        state: status.state,
                        folded_orders: status.folded_orders,
                        skipped_orders: status.skipped_orders,
                        last_paid_at: status.last_paid_at,
                    });
                }
                outcome => {
                    tracing::debug!(
                        user_id = %cmd.user_id,
                        attempt,
                        ?outcome,
                        "Recompute lost a version race, retrying"
                    );
                }
            }
        }

        tracing::warn!(user_id = %cmd.user_id, "Recompute retries exhausted");
        Err(SubscriptionError::concurrent_modification(cmd.user_id))
    }
}
