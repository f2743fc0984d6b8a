//! In-memory adapters for tests and local runs.

mod subscription_store;

pub use subscription_store::InMemorySubscriptionStore;
