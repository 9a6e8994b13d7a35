//! # Batch Channels
//!
//! Typed producers for the three pipeline topics.

use std::sync::Arc;

use tracing::debug;

use super::messages::{UnprocessedBatchElement, UnprocessedBatchOperation};
use super::topics::TopicNaming;
use super::traits::{MessagingService, QueueMessage};
use super::types::MessageId;
use super::MessagingError;
use crate::models::BatchElementCreateRequest;

#[derive(Clone)]
pub struct BatchChannels {
    messaging: Arc<dyn MessagingService>,
    topics: TopicNaming,
}

impl std::fmt::Debug for BatchChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchChannels")
            .field("provider", &self.messaging.provider_name())
            .field("topics", &self.topics)
            .finish()
    }
}

impl BatchChannels {
    pub fn new(messaging: Arc<dyn MessagingService>, topics: TopicNaming) -> Self {
        Self { messaging, topics }
    }

    pub fn messaging(&self) -> &Arc<dyn MessagingService> {
        &self.messaging
    }

    pub fn topics(&self) -> &TopicNaming {
        &self.topics
    }

    pub async fn ensure_topics(&self) -> Result<(), MessagingError> {
        self.messaging.ensure_topics(&self.topics.all()).await
    }

    /// Keyed by operation token
    pub async fn publish_unprocessed_operation(
        &self,
        payload: &UnprocessedBatchOperation,
    ) -> Result<MessageId, MessagingError> {
        let topic = self.topics.unprocessed_batch_operations();
        self.send(&topic, &payload.batch_operation.token, payload).await
    }

    /// Keyed by device id
    pub async fn publish_unprocessed_element(
        &self,
        payload: &UnprocessedBatchElement,
    ) -> Result<MessageId, MessagingError> {
        let topic = self.topics.unprocessed_batch_elements();
        let key = payload.batch_element.device_id.to_string();
        self.send(&topic, &key, payload).await
    }

    /// Dead letter for elements that could not be created, keyed by device token
    pub async fn publish_failed_element(
        &self,
        request: &BatchElementCreateRequest,
    ) -> Result<MessageId, MessagingError> {
        let topic = self.topics.failed_batch_elements();
        self.send(&topic, &request.device_token, request).await
    }

    async fn send<T: QueueMessage>(
        &self,
        topic: &str,
        key: &str,
        message: &T,
    ) -> Result<MessageId, MessagingError> {
        let payload = message.to_bytes()?;
        let id = self.messaging.send_keyed(topic, key, payload).await?;
        debug!(topic = %topic, key = %key, message_id = %id, "Published batch message");
        Ok(id)
    }
}
