//! In-memory implementation of SubscriptionStore.
//!
//! Used by tests and local runs. Subscribers and orders live behind a single
//! lock so that the conditional writes are atomic, matching the transactional
//! semantics of the PostgreSQL adapter.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, OrderId, UserId};
use crate::domain::subscription::{PaidOrder, SubscriberAccount};
use crate::ports::{ApplyOutcome, SubscriptionReplacement, SubscriptionStore, SubscriptionUpdate};

#[derive(Debug, Default)]
struct StoreState {
    subscribers: HashMap<UserId, SubscriberAccount>,
    orders: HashMap<OrderId, PaidOrder>,
}

/// In-memory subscription store.
#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemorySubscriptionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.state.read().await.subscribers.len()
    }

    /// Number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

fn subscriber_not_found(user_id: &UserId) -> DomainError {
    DomainError::new(
        ErrorCode::SubscriberNotFound,
        format!("No subscriber for user {}", user_id),
    )
    .with_detail("user_id", user_id.as_str())
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn find_subscriber(&self, user_id: &UserId) -> Result<Option<SubscriberAccount>, DomainError> {
        Ok(self.state.read().await.subscribers.get(user_id).cloned())
    }

    async fn insert_subscriber(&self, subscriber: &SubscriberAccount) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        if state.subscribers.contains_key(&subscriber.user_id) {
            return Err(DomainError::new(
                ErrorCode::SubscriberExists,
                format!("User {} is already registered", subscriber.user_id),
            ));
        }
        state
            .subscribers
            .insert(subscriber.user_id.clone(), subscriber.clone());
        Ok(())
    }

    async fn find_order(&self, order_id: &OrderId) -> Result<Option<PaidOrder>, DomainError> {
        Ok(self.state.read().await.orders.get(order_id).cloned())
    }

    async fn list_orders_for_user(&self, user_id: &UserId) -> Result<Vec<PaidOrder>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|order| &order.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_order(&self, order: &PaidOrder) -> Result<(), DomainError> {
        self.state
            .write()
            .await
            .orders
            .insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn apply_order(&self, update: &SubscriptionUpdate) -> Result<ApplyOutcome, DomainError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let order = state.orders.get_mut(&update.order_id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::OrderNotFound,
                format!("Order not found: {}", update.order_id),
            )
            .with_detail("order_id", update.order_id.as_str())
        })?;
        if order.is_applied() {
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        let subscriber = state
            .subscribers
            .get_mut(&update.user_id)
            .ok_or_else(|| subscriber_not_found(&update.user_id))?;
        if subscriber.is_superseded_by_applied(update.paid_at) {
            return Ok(ApplyOutcome::Superseded);
        }
        if subscriber.version != update.expected_version {
            return Ok(ApplyOutcome::Conflict);
        }

        order.subscription_applied_at = Some(update.applied_at);
        subscriber.state = update.new_state;
        subscriber.last_applied_paid_at = Some(update.paid_at);
        subscriber.version += 1;
        subscriber.updated_at = update.applied_at;

        Ok(ApplyOutcome::Applied)
    }

    async fn replace_subscription(
        &self,
        replacement: &SubscriptionReplacement,
    ) -> Result<ApplyOutcome, DomainError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let subscriber = state
            .subscribers
            .get_mut(&replacement.user_id)
            .ok_or_else(|| subscriber_not_found(&replacement.user_id))?;
        if subscriber.version != replacement.expected_version {
            return Ok(ApplyOutcome::Conflict);
        }

        subscriber.state = replacement.new_state;
        subscriber.last_applied_paid_at = replacement.last_applied_paid_at;
        subscriber.version += 1;
        subscriber.updated_at = replacement.applied_at;

        for order_id in &replacement.folded_orders {
            if let Some(order) = state.orders.get_mut(order_id) {
                if !order.is_applied() {
                    order.subscription_applied_at = Some(replacement.applied_at);
                }
            }
        }

        Ok(ApplyOutcome::Applied)
    }
}
