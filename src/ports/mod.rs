//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `SubscriptionStore` - Subscriber/order persistence with conditional writes
//! - `EventPublisher` - Port for publishing domain events

mod event_publisher;
mod subscription_store;

pub use event_publisher::EventPublisher;
pub use subscription_store::{
    ApplyOutcome, SubscriptionReplacement, SubscriptionStore, SubscriptionUpdate,
};
