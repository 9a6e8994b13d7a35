//! # Batch Operation Errors
//!
//! Structured error types shared by the persistence, messaging, registry and
//! orchestration layers.

use thiserror::Error;
use uuid::Uuid;

use crate::messaging::MessagingError;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Invalid batch operation id: {0}")]
    InvalidBatchOperationId(Uuid),

    #[error("Invalid batch operation token: {0}")]
    InvalidBatchOperationToken(String),

    #[error("Invalid batch element id: {0}")]
    InvalidBatchElementId(Uuid),

    #[error("Batch operation token already in use: {0}")]
    DuplicateBatchOperationToken(String),

    #[error("Batch element already exists for device {device_token} in operation {batch_operation_id}")]
    DuplicateBatchElement {
        batch_operation_id: Uuid,
        device_token: String,
    },

    #[error("Invalid device token: {0}")]
    InvalidDeviceToken(String),

    #[error("Invalid {entity} status transition: {from} -> {to}")]
    InvalidStatusTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Handler error for operation type {operation_type}: {message}")]
    Handler {
        operation_type: String,
        message: String,
    },

    #[error("No handler registered for operation type: {0}")]
    HandlerNotFound(String),

    #[error("Worker pool is not accepting work: {0}")]
    PoolShutdown(String),

    #[error("Invalid lifecycle state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl BatchError {
    pub fn handler(operation_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            operation_type: operation_type.into(),
            message: message.into(),
        }
    }

    pub fn invalid_transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidStatusTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// True for errors caused by a concurrent or repeated delivery racing a
    /// status change that already happened.
    pub fn is_stale_transition(&self) -> bool {
        matches!(self, Self::InvalidStatusTransition { .. })
    }
}

impl From<crate::config::ConfigurationError> for BatchError {
    fn from(err: crate::config::ConfigurationError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type BatchResult<T> = std::result::Result<T, BatchError>;
