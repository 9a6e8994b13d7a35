//! # Messaging Service Traits
//!
//! Provider-agnostic operations over partitioned, keyed topics with
//! independent consumer groups and at-least-once delivery.

use std::time::Duration;

use async_trait::async_trait;

use super::types::{MessageId, ReceiptHandle, ReceivedMessage, TopicStats};
use super::MessagingError;

/// Core messaging service trait
///
/// Payloads cross the trait as bytes so the service stays object safe and
/// can be shared as `Arc<dyn MessagingService>`. Typed encoding lives in
/// [`QueueMessage`].
///
/// Delivery guarantees expected of providers:
/// - messages with the same key land in the same partition and are delivered
///   to a group in send order;
/// - a received message stays invisible to its group for the visibility
///   timeout, then is redelivered unless acknowledged.
#[async_trait]
pub trait MessagingService: Send + Sync + 'static {
    /// Create a topic if it doesn't exist (idempotent)
    async fn ensure_topic(&self, topic: &str) -> Result<(), MessagingError>;

    async fn ensure_topics(&self, topics: &[String]) -> Result<(), MessagingError> {
        for topic in topics {
            self.ensure_topic(topic).await?;
        }
        Ok(())
    }

    /// Append a message to the partition selected by `key`
    async fn send_keyed(
        &self,
        topic: &str,
        key: &str,
        payload: Vec<u8>,
    ) -> Result<MessageId, MessagingError>;

    /// Receive up to `max_messages` visible messages for a consumer group
    async fn receive(
        &self,
        topic: &str,
        group: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, MessagingError>;

    /// Acknowledge successful handling; the group never sees the message again
    async fn ack(
        &self,
        topic: &str,
        group: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError>;

    /// Negative acknowledge. `requeue` makes the message visible immediately,
    /// otherwise it is dropped for this group.
    async fn nack(
        &self,
        topic: &str,
        group: &str,
        receipt_handle: &ReceiptHandle,
        requeue: bool,
    ) -> Result<(), MessagingError>;

    async fn topic_stats(&self, topic: &str) -> Result<TopicStats, MessagingError>;

    async fn health_check(&self) -> Result<bool, MessagingError>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}

/// Message serialization contract
pub trait QueueMessage: Send + Sync + Clone + 'static {
    fn to_bytes(&self) -> Result<Vec<u8>, MessagingError>;

    fn from_bytes(bytes: &[u8]) -> Result<Self, MessagingError>
    where
        Self: Sized;
}

/// JSON encoding for every serde-compatible type
impl<T> QueueMessage for T
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + Clone + 'static,
{
    fn to_bytes(&self) -> Result<Vec<u8>, MessagingError> {
        serde_json::to_vec(self).map_err(|e| MessagingError::serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, MessagingError> {
        serde_json::from_slice(bytes).map_err(|e| MessagingError::deserialization(e.to_string()))
    }
}
