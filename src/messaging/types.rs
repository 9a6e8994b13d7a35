//! # Messaging Types
//!
//! Provider-agnostic identifiers, received message envelopes and topic
//! statistics.

use chrono::{DateTime, Utc};
use std::fmt;

use super::traits::QueueMessage;
use super::MessagingError;

/// Unique identifier assigned to a message by the provider
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle for acknowledging a received message within its consumer group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(pub String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A raw message delivered to a consumer group
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub receipt_handle: ReceiptHandle,
    /// Partition key the producer supplied
    pub key: String,
    pub partition: usize,
    pub payload: Vec<u8>,
    /// Deliveries to this group so far, including this one
    pub receive_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl ReceivedMessage {
    pub fn decode<T: QueueMessage>(&self) -> Result<QueuedMessage<T>, MessagingError> {
        Ok(QueuedMessage {
            receipt_handle: self.receipt_handle.clone(),
            key: self.key.clone(),
            message: T::from_bytes(&self.payload)?,
            receive_count: self.receive_count,
            enqueued_at: self.enqueued_at,
        })
    }
}

/// A received message with its decoded payload
#[derive(Debug, Clone)]
pub struct QueuedMessage<T> {
    pub receipt_handle: ReceiptHandle,
    pub key: String,
    pub message: T,
    pub receive_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Topic statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicStats {
    pub topic: String,
    pub partitions: usize,
    /// Messages ever appended to the log
    pub total_sent: u64,
    /// Messages acknowledged across all consumer groups
    pub total_acked: u64,
    /// Messages rejected without requeue across all consumer groups
    pub total_rejected: u64,
    /// Received but neither acknowledged nor rejected, across all groups
    pub in_flight_count: u64,
}
