//! Subscription domain events.
//!
//! Emitted for audit and for the manual review queue. Named in past tense.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainEvent, EventId, OrderId, Timestamp, UserId};

use super::{AccrualKind, PlanSource, PlanType};

/// Events that occur while applying paid orders to subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionEvent {
    /// A paid order's plan was applied to the subscriber.
    Applied {
        event_id: EventId,
        user_id: UserId,
        order_id: OrderId,
        plan: PlanType,
        plan_source: PlanSource,
        kind: AccrualKind,
        previous_expires_at: Option<Timestamp>,
        expires_at: Timestamp,
        plan_changed_while_active: bool,
        occurred_at: Timestamp,
    },

    /// A paid order could not be classified; the subscription was left as is.
    ClassificationFailed {
        event_id: EventId,
        user_id: UserId,
        order_id: OrderId,
        description: String,
        amount_minor: i64,
        currency: String,
        occurred_at: Timestamp,
    },

    /// The subscription was rebuilt from the full order history.
    Recomputed {
        event_id: EventId,
        user_id: UserId,
        subscription_type: Option<PlanType>,
        expires_at: Option<Timestamp>,
        folded_orders: usize,
        skipped_orders: usize,
        occurred_at: Timestamp,
    },
}

impl SubscriptionEvent {
    /// Returns the user ID associated with this event.
    pub fn user_id(&self) -> &UserId {
        match self {
            SubscriptionEvent::Applied { user_id, .. }
            | SubscriptionEvent::ClassificationFailed { user_id, .. }
            | SubscriptionEvent::Recomputed { user_id, .. } => user_id,
        }
    }
}

impl DomainEvent for SubscriptionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SubscriptionEvent::Applied { .. } => "subscription.applied.v1",
            SubscriptionEvent::ClassificationFailed { .. } => {
                "subscription.classification_failed.v1"
            }
            SubscriptionEvent::Recomputed { .. } => "subscription.recomputed.v1",
        }
    }

    fn aggregate_id(&self) -> String {
        self.user_id().to_string()
    }

    fn aggregate_type(&self) -> &'static str {
        "Subscriber"
    }

    fn occurred_at(&self) -> Timestamp {
        match self {
            SubscriptionEvent::Applied { occurred_at, .. }
            | SubscriptionEvent::ClassificationFailed { occurred_at, .. }
            | SubscriptionEvent::Recomputed { occurred_at, .. } => *occurred_at,
        }
    }

    fn event_id(&self) -> EventId {
        match self {
            SubscriptionEvent::Applied { event_id, .. }
            | SubscriptionEvent::ClassificationFailed { event_id, .. }
            | SubscriptionEvent::Recomputed { event_id, .. } => event_id.clone(),
        }
    }
}
