//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod subscription;

pub use subscription::{
    // Commands
    ApplyPaidOrderCommand, ApplyPaidOrderHandler, ApplyPaidOrderResult,
    RecomputeSubscriptionCommand, RecomputeSubscriptionHandler, RecomputeSubscriptionResult,
    RegisterSubscriberCommand, RegisterSubscriberHandler, RegisterSubscriberResult,
    // Queries
    GetSubscriptionStatusHandler, GetSubscriptionStatusQuery, SubscriptionStatusView,
    DEFAULT_MAX_APPLY_ATTEMPTS,
};
