//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresSubscriptionStore` - Subscribers and paid orders with
//!   transactional conditional apply

mod subscription_store;

pub use subscription_store::{run_migrations, PostgresSubscriptionStore};
