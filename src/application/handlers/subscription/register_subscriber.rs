//! RegisterSubscriberHandler - Command handler that records a user's region.
//!
//! The region is fixed at registration. Registering again in the same region
//! returns the existing account; registering in another region is rejected.

use std::sync::Arc;

use crate::adapters::RegionRouter;
use crate::domain::foundation::{ErrorCode, Timestamp, UserId};
use crate::domain::subscription::{Region, SubscriberAccount, SubscriptionError};

/// Command to register a subscriber in a region.
#[derive(Debug, Clone)]
pub struct RegisterSubscriberCommand {
    pub user_id: UserId,
    pub region: Region,
}

/// Result of registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSubscriberResult {
    pub subscriber: SubscriberAccount,
    /// False if the user was already registered in this region.
    pub created: bool,
}

/// Handler for registering subscribers.
pub struct RegisterSubscriberHandler {
    router: Arc<RegionRouter>,
}

impl RegisterSubscriberHandler {
    pub fn new(router: Arc<RegionRouter>) -> Self {
        Self { router }
    }

    pub async fn handle(
        &self,
        cmd: RegisterSubscriberCommand,
    ) -> Result<RegisterSubscriberResult, SubscriptionError> {
        // 1. Region must be served here
        let store = self.router.store_for(cmd.region)?;

        // 2. A user lives in exactly one region
        if let Some((registered, subscriber)) = self.router.locate(&cmd.user_id).await? {
            if registered != cmd.region {
                return Err(SubscriptionError::RegionMismatch {
                    user_id: cmd.user_id,
                    registered,
                    requested: cmd.region,
                });
            }
            return Ok(RegisterSubscriberResult {
                subscriber,
                created: false,
            });
        }

        // 3. Persist
        let subscriber = SubscriberAccount::register(cmd.user_id.clone(), cmd.region, Timestamp::now());
        match store.insert_subscriber(&subscriber).await {
            Ok(()) => {}
            Err(err) if err.code == ErrorCode::SubscriberExists => {
                return Err(SubscriptionError::SubscriberExists(cmd.user_id));
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(user_id = %cmd.user_id, region = %cmd.region, "Subscriber registered");

        Ok(RegisterSubscriberResult {
            subscriber,
            created: true,
        })
    }
}
