//! Region routing for subscription stores.
//!
//! Each deployment region keeps its own subscriber data. The router maps a
//! persisted `Region` to the store that serves it. A user is looked up by the
//! region recorded at registration, never by the shape of their id.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::foundation::UserId;
use crate::domain::subscription::{Region, SubscriberAccount, SubscriptionError};
use crate::ports::SubscriptionStore;

/// Maps regions to the stores that serve them.
#[derive(Clone, Default)]
pub struct RegionRouter {
    stores: HashMap<Region, Arc<dyn SubscriptionStore>>,
}

impl RegionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router that serves exactly one region.
    pub fn single(region: Region, store: Arc<dyn SubscriptionStore>) -> Self {
        Self::new().with_region(region, store)
    }

    /// Adds (or replaces) the store for a region.
    pub fn with_region(mut self, region: Region, store: Arc<dyn SubscriptionStore>) -> Self {
        self.stores.insert(region, store);
        self
    }

    /// Regions this router serves, in a stable order.
    pub fn regions(&self) -> Vec<Region> {
        let mut regions: Vec<Region> = self.stores.keys().copied().collect();
        regions.sort_by_key(|region| region.as_str());
        regions
    }

    /// Returns the store for a region.
    ///
    /// # Errors
    ///
    /// `ValidationFailed` if the region is not served by this deployment.
    pub fn store_for(&self, region: Region) -> Result<Arc<dyn SubscriptionStore>, SubscriptionError> {
        self.stores.get(&region).cloned().ok_or_else(|| {
            SubscriptionError::validation("region", format!("region '{}' is not served here", region))
        })
    }

    /// Finds the region a user is registered in, with their account.
    pub async fn locate(
        &self,
        user_id: &UserId,
    ) -> Result<Option<(Region, SubscriberAccount)>, SubscriptionError> {
        for region in self.regions() {
            let store = self.store_for(region)?;
            if let Some(account) = store.find_subscriber(user_id).await? {
                return Ok(Some((region, account)));
            }
        }
        Ok(None)
    }
}
