//! Subscription-specific error types.
//!
//! # Status Mapping
//!
//! | Error | Caller action |
//! |-------|---------------|
//! | OrderNotFound / SubscriberNotFound | reject |
//! | OrderNotPaid | reject, wait for confirmation |
//! | ClassificationFailed | no change, manual review |
//! | MissingPaymentTimestamp | no change, data repair |
//! | ConcurrentModification | retry later |
//! | Infrastructure | retry later |

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, OrderId, UserId};

use super::{PaymentStatus, Region};

/// Subscription-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("No subscriber found for user: {0}")]
    SubscriberNotFound(UserId),

    #[error("User {0} is already registered")]
    SubscriberExists(UserId),

    #[error("Order {order_id} is not paid (status: {status})")]
    OrderNotPaid {
        order_id: OrderId,
        status: PaymentStatus,
    },

    #[error("Cannot determine plan for order {order_id} from description '{description}'")]
    ClassificationFailed {
        order_id: OrderId,
        description: String,
    },

    #[error("Order {0} has no paid, updated or created timestamp")]
    MissingPaymentTimestamp(OrderId),

    #[error("Subscription for user {0} kept changing concurrently")]
    ConcurrentModification(UserId),

    #[error("User {user_id} is registered in {registered}, not {requested}")]
    RegionMismatch {
        user_id: UserId,
        registered: Region,
        requested: Region,
    },

    #[error("Validation failed for '{field}': {message}")]
    ValidationFailed { field: String, message: String },

    #[error("Error: {0}")]
    Infrastructure(String),
}

impl SubscriptionError {
    pub fn order_not_found(id: OrderId) -> Self {
        SubscriptionError::OrderNotFound(id)
    }

    pub fn subscriber_not_found(user_id: UserId) -> Self {
        SubscriptionError::SubscriberNotFound(user_id)
    }

    pub fn order_not_paid(order_id: OrderId, status: PaymentStatus) -> Self {
        SubscriptionError::OrderNotPaid { order_id, status }
    }

    pub fn classification_failed(order_id: OrderId, description: impl Into<String>) -> Self {
        SubscriptionError::ClassificationFailed {
            order_id,
            description: description.into(),
        }
    }

    pub fn missing_payment_timestamp(order_id: OrderId) -> Self {
        SubscriptionError::MissingPaymentTimestamp(order_id)
    }

    pub fn concurrent_modification(user_id: UserId) -> Self {
        SubscriptionError::ConcurrentModification(user_id)
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SubscriptionError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        SubscriptionError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SubscriptionError::OrderNotFound(_) => ErrorCode::OrderNotFound,
            SubscriptionError::SubscriberNotFound(_) => ErrorCode::SubscriberNotFound,
            SubscriptionError::SubscriberExists(_) => ErrorCode::SubscriberExists,
            SubscriptionError::OrderNotPaid { .. } => ErrorCode::OrderNotPaid,
            SubscriptionError::ClassificationFailed { .. } => ErrorCode::PlanClassificationFailed,
            SubscriptionError::MissingPaymentTimestamp(_) => ErrorCode::MissingPaymentTimestamp,
            SubscriptionError::ConcurrentModification(_) => ErrorCode::ConcurrentModification,
            SubscriptionError::RegionMismatch { .. } => ErrorCode::RegionMismatch,
            SubscriptionError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            SubscriptionError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns true if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubscriptionError::Infrastructure(_) | SubscriptionError::ConcurrentModification(_)
        )
    }
}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => SubscriptionError::ValidationFailed {
                field: err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            ErrorCode::OrderNotFound => match err.details.get("order_id").map(OrderId::new) {
                Some(Ok(order_id)) => SubscriptionError::OrderNotFound(order_id),
                _ => SubscriptionError::Infrastructure(err.to_string()),
            },
            ErrorCode::SubscriberNotFound => match err.details.get("user_id").map(UserId::new) {
                Some(Ok(user_id)) => SubscriptionError::SubscriberNotFound(user_id),
                _ => SubscriptionError::Infrastructure(err.to_string()),
            },
            _ => SubscriptionError::Infrastructure(err.to_string()),
        }
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}
