//! GetSubscriptionStatusHandler - Query handler for a user's current subscription.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{PlanType, Region, SubscriptionError};
use crate::ports::SubscriptionStore;

/// Query for a user's subscription status.
#[derive(Debug, Clone)]
pub struct GetSubscriptionStatusQuery {
    pub user_id: UserId,
    pub as_of: Timestamp,
}

impl GetSubscriptionStatusQuery {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            as_of: Timestamp::now(),
        }
    }
}

/// Subscription status as shown to the user.
///
/// An expiry at or before `as_of` is reported as no subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionStatusView {
    pub user_id: UserId,
    pub region: Region,
    pub subscription_type: Option<PlanType>,
    pub expires_at: Option<Timestamp>,
    pub is_active: bool,
    pub days_remaining: u32,
}

/// Handler for reading subscription status.
pub struct GetSubscriptionStatusHandler {
    store: Arc<dyn SubscriptionStore>,
}

impl GetSubscriptionStatusHandler {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    pub async fn handle(
        &self,
        query: GetSubscriptionStatusQuery,
    ) -> Result<SubscriptionStatusView, SubscriptionError> {
        let subscriber = self
            .store
            .find_subscriber(&query.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::subscriber_not_found(query.user_id.clone()))?;

        let current = subscriber.state.current_at(query.as_of);

        Ok(SubscriptionStatusView {
            user_id: subscriber.user_id,
            region: subscriber.region,
            subscription_type: current.subscription_type,
            expires_at: current.expires_at,
            is_active: subscriber.state.is_active(query.as_of),
            days_remaining: subscriber.state.days_remaining(query.as_of),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemorySubscriptionStore;
    use crate::domain::subscription::{SubscriberAccount, SubscriptionState};

    fn ts(value: &str) -> Timestamp {
        Timestamp::parse_rfc3339(value).unwrap()
    }

    fn user_id() -> UserId {
        UserId::new("user-1").unwrap()
    }

    async fn handler_with(state: SubscriptionState) -> GetSubscriptionStatusHandler {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let mut subscriber =
            SubscriberAccount::register(user_id(), Region::China, ts("2024-01-01T00:00:00Z"));
        subscriber.state = state;
        store.insert_subscriber(&subscriber).await.unwrap();
        GetSubscriptionStatusHandler::new(store)
    }

    fn query(as_of: &str) -> GetSubscriptionStatusQuery {
        GetSubscriptionStatusQuery {
            user_id: user_id(),
            as_of: ts(as_of),
        }
    }

    #[tokio::test]
    async fn active_subscription_reports_remaining_days() {
        let handler = handler_with(SubscriptionState::new(
            Some(PlanType::Monthly),
            Some(ts("2024-03-10T12:00:00Z")),
        ))
        .await;

        let view = handler.handle(query("2024-03-01T00:00:00Z")).await.unwrap();

        assert!(view.is_active);
        assert_eq!(view.subscription_type, Some(PlanType::Monthly));
        assert_eq!(view.days_remaining, 10);
        assert_eq!(view.region, Region::China);
    }

    #[tokio::test]
    async fn expired_subscription_reports_nothing() {
        let handler = handler_with(SubscriptionState::new(
            Some(PlanType::Yearly),
            Some(ts("2024-03-01T00:00:00Z")),
        ))
        .await;

        let view = handler.handle(query("2024-03-01T00:00:00Z")).await.unwrap();

        assert!(!view.is_active);
        assert_eq!(view.subscription_type, None);
        assert_eq!(view.expires_at, None);
        assert_eq!(view.days_remaining, 0);
    }

    #[tokio::test]
    async fn never_subscribed_user_is_inactive() {
        let handler = handler_with(SubscriptionState::none()).await;

        let view = handler.handle(query("2024-03-01T00:00:00Z")).await.unwrap();

        assert!(!view.is_active);
        assert_eq!(view.days_remaining, 0);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let handler = GetSubscriptionStatusHandler::new(Arc::new(InMemorySubscriptionStore::new()));

        let result = handler.handle(query("2024-03-01T00:00:00Z")).await;

        assert!(matches!(result, Err(SubscriptionError::SubscriberNotFound(_))));
    }
}
