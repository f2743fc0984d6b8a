//! Subscription handlers.
//!
//! ## Commands
//! - Applying a paid order on payment confirmation
//! - Recomputing a subscription from order history
//! - Registering a subscriber in a region
//!
//! ## Queries
//! - Get subscription status

mod apply_paid_order;
mod get_subscription_status;
mod recompute_subscription;
mod register_subscriber;

use crate::domain::foundation::{OrderId, SerializableDomainEvent};
use crate::domain::subscription::SubscriptionEvent;
use crate::ports::EventPublisher;

// Commands
pub use apply_paid_order::{ApplyPaidOrderCommand, ApplyPaidOrderHandler, ApplyPaidOrderResult};
pub use recompute_subscription::{
    RecomputeSubscriptionCommand, RecomputeSubscriptionHandler, RecomputeSubscriptionResult,
};
pub use register_subscriber::{
    RegisterSubscriberCommand, RegisterSubscriberHandler, RegisterSubscriberResult,
};

// Queries
pub use get_subscription_status::{
    GetSubscriptionStatusHandler, GetSubscriptionStatusQuery, SubscriptionStatusView,
};

/// Version-conflict retries before a write gives up.
pub const DEFAULT_MAX_APPLY_ATTEMPTS: u32 = 3;

/// Publishes an event after its state change has been committed.
///
/// The write is already durable at this point, so a publish failure is
/// logged rather than returned.
async fn publish_event(
    publisher: &dyn EventPublisher,
    event: &SubscriptionEvent,
    order_id: Option<&OrderId>,
) {
    let envelope = match event.to_envelope() {
        Ok(envelope) => envelope.with_user_id(event.user_id().as_str()),
        Err(err) => {
            tracing::error!(error = %err, "Failed to serialize subscription event");
            return;
        }
    };
    let envelope = match order_id {
        Some(order_id) => envelope.with_correlation_id(order_id.as_str()),
        None => envelope,
    };

    let event_type = envelope.event_type.clone();
    if let Err(err) = publisher.publish(envelope).await {
        tracing::error!(event_type = %event_type, error = %err, "Failed to publish subscription event");
    }
}
