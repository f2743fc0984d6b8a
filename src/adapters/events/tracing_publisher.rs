//! Event publisher that writes events to the tracing log.
//!
//! Used by the reconcile binary, where the log is the audit trail and the
//! manual review queue is fed from `subscription.classification_failed.v1`
//! log lines.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventEnvelope};
use crate::ports::EventPublisher;

/// Publishes each envelope as one structured `info` log record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventPublisher;

impl TracingEventPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            occurred_at = %event.occurred_at,
            payload = %event.payload,
            "Domain event"
        );
        Ok(())
    }
}
