//! # Messaging Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    #[error("Topic not found: {topic}")]
    TopicNotFound { topic: String },

    #[error("Topic operation failed: {topic}: {operation}: {message}")]
    TopicOperation {
        topic: String,
        operation: String,
        message: String,
    },

    #[error("Unknown receipt handle {receipt} for topic {topic}")]
    ReceiptNotFound { topic: String, receipt: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    /// Create a topic not found error
    pub fn topic_not_found(topic: impl Into<String>) -> Self {
        Self::TopicNotFound {
            topic: topic.into(),
        }
    }

    /// Create a topic operation error
    pub fn topic_operation(
        topic: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::TopicOperation {
            topic: topic.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn receipt_not_found(topic: impl Into<String>, receipt: impl Into<String>) -> Self {
        Self::ReceiptNotFound {
            topic: topic.into(),
            receipt: receipt.into(),
        }
    }

    /// Create a message serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    /// Create a message deserialization error
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// A malformed payload will never decode, no matter how often it is redelivered
    pub fn is_poison(&self) -> bool {
        matches!(self, Self::MessageDeserialization { .. })
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
