//! ApplyPaidOrderHandler - Command handler invoked on payment confirmation.
//!
//! Every confirmation path (provider webhook, client callback, admin
//! reconciliation) goes through this handler so that accrual happens in
//! exactly one place.

use std::sync::Arc;

use crate::domain::foundation::{EventId, OrderId, Timestamp, UserId};
use crate::domain::subscription::{
    evaluate, resolve_plan, AccrualKind, ClassificationPolicy, PaidOrder, PlanSource, PlanType,
    SubscriptionError, SubscriptionEvent,
};
use crate::ports::{ApplyOutcome, EventPublisher, SubscriptionStore, SubscriptionUpdate};

use super::{
    publish_event, RecomputeSubscriptionCommand, RecomputeSubscriptionHandler,
    RecomputeSubscriptionResult, DEFAULT_MAX_APPLY_ATTEMPTS,
};

/// Command to apply a confirmed payment to the buyer's subscription.
#[derive(Debug, Clone)]
pub struct ApplyPaidOrderCommand {
    pub order_id: OrderId,
    /// When the confirmation was received. Stamped on the order's applied
    /// marker and on emitted events.
    pub received_at: Timestamp,
}

impl ApplyPaidOrderCommand {
    /// Confirmation received now.
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            received_at: Timestamp::now(),
        }
    }
}

/// Result of applying a paid order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyPaidOrderResult {
    /// The order's plan was accrued onto the subscription.
    Applied {
        user_id: UserId,
        order_id: OrderId,
        plan: PlanType,
        plan_source: PlanSource,
        kind: AccrualKind,
        expires_at: Timestamp,
        /// Whether the new expiry still lies ahead of `received_at`.
        is_active: bool,
        plan_changed_while_active: bool,
    },
    /// The order had been applied before; nothing changed.
    AlreadyApplied { order_id: OrderId },
    /// A newer order had already been applied, so the subscription was
    /// rebuilt from the whole history instead.
    Recomputed(RecomputeSubscriptionResult),
}

/// Handler for applying paid orders.
///
/// # Flow
///
/// 1. Load the order; it must be paid and carry a payment time
/// 2. Skip if its applied marker is set
/// 3. Resolve the plan (plan code, description, amount)
/// 4. Load the subscriber, evaluate, and write conditionally
/// 5. Retry on version conflict, recompute when superseded
pub struct ApplyPaidOrderHandler {
    store: Arc<dyn SubscriptionStore>,
    event_publisher: Arc<dyn EventPublisher>,
    policy: ClassificationPolicy,
    max_attempts: u32,
    recompute: RecomputeSubscriptionHandler,
}

impl ApplyPaidOrderHandler {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        event_publisher: Arc<dyn EventPublisher>,
        policy: ClassificationPolicy,
    ) -> Self {
        let recompute =
            RecomputeSubscriptionHandler::new(store.clone(), event_publisher.clone(), policy);
        Self {
            store,
            event_publisher,
            policy,
            max_attempts: DEFAULT_MAX_APPLY_ATTEMPTS,
            recompute,
        }
    }

    /// Sets how many times a version conflict is retried before giving up.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        let max_attempts = max_attempts.max(1);
        self.max_attempts = max_attempts;
        self.recompute = self.recompute.with_max_attempts(max_attempts);
        self
    }

    pub async fn handle(
        &self,
        cmd: ApplyPaidOrderCommand,
    ) -> Result<ApplyPaidOrderResult, SubscriptionError> {
        // 1. Load and check the order
        let order = self
            .store
            .find_order(&cmd.order_id)
            .await?
            .ok_or_else(|| SubscriptionError::order_not_found(cmd.order_id.clone()))?;

        if !order.is_paid() {
            return Err(SubscriptionError::order_not_paid(
                order.id.clone(),
                order.payment_status,
            ));
        }

        // 2. Duplicate delivery
        if order.is_applied() {
            tracing::info!(order_id = %order.id, "Order already applied, skipping");
            return Ok(ApplyPaidOrderResult::AlreadyApplied { order_id: order.id });
        }

        let paid_at = order
            .effective_paid_at()
            .ok_or_else(|| SubscriptionError::missing_payment_timestamp(order.id.clone()))?;

        // 3. Resolve the plan; an unknown plan never changes the subscription
        let resolution = match resolve_plan(&order, &self.policy) {
            Ok(resolution) => resolution,
            Err(err) => {
                self.report_unclassified(&order, &cmd).await;
                return Err(err);
            }
        };

        // 4-5. Evaluate and write conditionally
        for attempt in 1..=self.max_attempts {
            let subscriber = self
                .store
                .find_subscriber(&order.user_id)
                .await?
                .ok_or_else(|| SubscriptionError::subscriber_not_found(order.user_id.clone()))?;

            if subscriber.is_superseded_by_applied(paid_at) {
                return self.recompute_superseded(&order, &cmd).await;
            }

            let outcome = evaluate(&subscriber.state, resolution.plan, paid_at);
            let expires_at = outcome.state.expires_at.unwrap_or(paid_at);
            if outcome.plan_changed_while_active {
                tracing::warn!(
                    user_id = %order.user_id,
                    order_id = %order.id,
                    previous = ?subscriber.state.subscription_type,
                    plan = %resolution.plan,
                    "Plan type overwritten while previous plan still active"
                );
            }

            let update = SubscriptionUpdate {
                user_id: order.user_id.clone(),
                order_id: order.id.clone(),
                expected_version: subscriber.version,
                paid_at,
                new_state: outcome.state,
                applied_at: cmd.received_at,
            };

            match self.store.apply_order(&update).await? {
                ApplyOutcome::Applied => {
                    tracing::info!(
                        user_id = %order.user_id,
                        order_id = %order.id,
                        plan = %resolution.plan,
                        source = ?resolution.source,
                        kind = ?outcome.kind,
                        expires_at = %expires_at,
                        "Subscription accrued"
                    );

                    let event = SubscriptionEvent::Applied {
                        event_id: EventId::new(),
                        user_id: order.user_id.clone(),
                        order_id: order.id.clone(),
                        plan: resolution.plan,
                        plan_source: resolution.source,
                        kind: outcome.kind,
                        previous_expires_at: subscriber.state.expires_at,
                        expires_at,
                        plan_changed_while_active: outcome.plan_changed_while_active,
                        occurred_at: cmd.received_at,
                    };
                    publish_event(self.event_publisher.as_ref(), &event, Some(&order.id)).await;

                    return Ok(ApplyPaidOrderResult::Applied {
                        user_id: order.user_id,
                        order_id: order.id,
                        plan: resolution.plan,
                        plan_source: resolution.source,
                        kind: outcome.kind,
                        expires_at,
                        is_active: outcome.active_at(cmd.received_at),
                        plan_changed_while_active: outcome.plan_changed_while_active,
                    });
                }
                ApplyOutcome::AlreadyApplied => {
                    tracing::info!(order_id = %order.id, "Order applied concurrently, skipping");
                    return Ok(ApplyPaidOrderResult::AlreadyApplied { order_id: order.id });
                }
                ApplyOutcome::Superseded => {
                    return self.recompute_superseded(&order, &cmd).await;
                }
                ApplyOutcome::Conflict => {
                    tracing::debug!(
                        user_id = %order.user_id,
                        order_id = %order.id,
                        attempt,
                        "Subscriber changed while applying, retrying"
                    );
                }
            }
        }

        tracing::warn!(
            user_id = %order.user_id,
            order_id = %order.id,
            attempts = self.max_attempts,
            "Apply retries exhausted"
        );
        Err(SubscriptionError::concurrent_modification(order.user_id))
    }

    async fn recompute_superseded(
        &self,
        order: &PaidOrder,
        cmd: &ApplyPaidOrderCommand,
    ) -> Result<ApplyPaidOrderResult, SubscriptionError> {
        tracing::info!(
            user_id = %order.user_id,
            order_id = %order.id,
            "Order predates an applied order, recomputing from history"
        );
        let result = self
            .recompute
            .handle(RecomputeSubscriptionCommand {
                user_id: order.user_id.clone(),
                as_of: cmd.received_at,
            })
            .await?;
        Ok(ApplyPaidOrderResult::Recomputed(result))
    }

    async fn report_unclassified(&self, order: &PaidOrder, cmd: &ApplyPaidOrderCommand) {
        tracing::error!(
            user_id = %order.user_id,
            order_id = %order.id,
            description = %order.plan_description,
            amount_minor = order.amount_minor,
            currency = %order.currency,
            "Cannot determine plan for paid order, needs manual review"
        );

        let event = SubscriptionEvent::ClassificationFailed {
            event_id: EventId::new(),
            user_id: order.user_id.clone(),
            order_id: order.id.clone(),
            description: order.plan_description.clone(),
            amount_minor: order.amount_minor,
            currency: order.currency.clone(),
            occurred_at: cmd.received_at,
        };
        publish_event(self.event_publisher.as_ref(), &event, Some(&order.id)).await;
    }
}
