//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, event infrastructure and error types
//! shared by the subscription domain.

mod errors;
mod events;
mod ids;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{DomainEvent, EventEnvelope, EventId, EventMetadata, SerializableDomainEvent};
pub use ids::{OrderId, UserId};
pub use timestamp::Timestamp;
