//! Subscription domain module.
//!
//! Turns confirmed payments into subscription expiry changes.
//!
//! # Module Structure
//!
//! - `plan` - PlanType and the free-text / amount classifiers
//! - `classifier` - Plan resolution for an order (code, description, amount)
//! - `accrual` - The pure expiry accrual evaluator
//! - `history` - Recompute of the current state from all paid orders
//! - `order` - PaidOrder entity and PaymentStatus
//! - `state` - SubscriptionState value object
//! - `subscriber` - SubscriberAccount aggregate
//! - `region` - Persisted deployment region
//! - `events` - Domain events
//! - `errors` - SubscriptionError

mod accrual;
mod classifier;
mod errors;
mod events;
mod history;
mod order;
mod plan;
mod region;
mod state;
mod subscriber;

pub use accrual::{evaluate, AccrualKind, AccrualOutcome};
pub use classifier::{resolve_plan, ClassificationPolicy, PlanResolution, PlanSource};
pub use errors::SubscriptionError;
pub use events::SubscriptionEvent;
pub use history::{recompute_from_history, HistoricalStatus};
pub use order::{PaidOrder, PaymentStatus};
pub use plan::{PlanType, MONTHLY_PERIOD_DAYS};
pub use region::Region;
pub use state::SubscriptionState;
pub use subscriber::SubscriberAccount;
