//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `memory` - In-memory subscription store
//! - `postgres` - PostgreSQL subscription store and migrations
//! - `events` - Event publishers (in-memory, tracing)
//! - `region_router` - Per-region store selection

pub mod events;
pub mod memory;
pub mod postgres;
mod region_router;

pub use events::{InMemoryEventBus, TracingEventPublisher};
pub use memory::InMemorySubscriptionStore;
pub use postgres::{run_migrations, PostgresSubscriptionStore};
pub use region_router::RegionRouter;
