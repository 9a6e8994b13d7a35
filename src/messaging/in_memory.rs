//! # In-Memory Messaging Service
//!
//! Partitioned, append-only topic logs with per-group delivery tracking, for
//! tests and single-process deployments.
//!
//! - **Partitioning**: the message key hashes to a fixed partition, so one key
//!   always sees send order
//! - **Consumer groups**: every group reads the whole log independently,
//!   starting from the earliest message
//! - **Visibility timeout**: unacknowledged deliveries become visible again
//!   once the timeout elapses

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::traits::{MessagingService, QueueMessage};
use super::types::{MessageId, ReceiptHandle, ReceivedMessage, TopicStats};
use super::MessagingError;
use crate::constants::defaults;

#[derive(Debug, Clone)]
struct StoredMessage {
    /// Global send sequence, used to report messages in send order
    sequence: u64,
    key: String,
    payload: Vec<u8>,
    enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Delivery {
    receive_count: u32,
    visible_at: Instant,
}

/// Delivery state of one consumer group on one partition
#[derive(Debug, Default)]
struct PartitionCursor {
    /// Every offset below this one is settled
    low_water: usize,
    settled: HashSet<usize>,
    in_flight: BTreeMap<usize, Delivery>,
}

impl PartitionCursor {
    fn settle(&mut self, offset: usize) -> bool {
        if offset < self.low_water || !self.settled.insert(offset) {
            return false;
        }
        self.in_flight.remove(&offset);
        while self.settled.remove(&self.low_water) {
            self.low_water += 1;
        }
        true
    }
}

#[derive(Debug)]
struct InMemoryTopic {
    partitions: Vec<Vec<StoredMessage>>,
    groups: HashMap<String, Vec<PartitionCursor>>,
    total_sent: u64,
    total_acked: u64,
    total_rejected: u64,
}

impl InMemoryTopic {
    fn new(partitions: usize) -> Self {
        Self {
            partitions: (0..partitions).map(|_| Vec::new()).collect(),
            groups: HashMap::new(),
            total_sent: 0,
            total_acked: 0,
            total_rejected: 0,
        }
    }

    fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions.len() as u64) as usize
    }
}

fn parse_receipt(topic: &str, receipt: &ReceiptHandle) -> Result<(usize, usize), MessagingError> {
    let invalid = || MessagingError::receipt_not_found(topic, receipt.as_str());
    let (partition, offset) = receipt.as_str().split_once(':').ok_or_else(invalid)?;
    Ok((
        partition.parse().map_err(|_| invalid())?,
        offset.parse().map_err(|_| invalid())?,
    ))
}

/// In-memory messaging service
///
/// ```rust
/// use batch_ops_core::messaging::{InMemoryMessagingService, MessagingService};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = InMemoryMessagingService::new();
/// service.ensure_topic("devices").await?;
/// service.send_keyed("devices", "d1", b"{}".to_vec()).await?;
///
/// let received = service
///     .receive("devices", "group-a", 10, Duration::from_secs(30))
///     .await?;
/// service.ack("devices", "group-a", &received[0].receipt_handle).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryMessagingService {
    topics: RwLock<HashMap<String, InMemoryTopic>>,
    partitions: usize,
    sequence: AtomicU64,
    /// Topics whose sends fail, for exercising publish error paths
    failing_topics: parking_lot::RwLock<HashSet<String>>,
}

impl Default for InMemoryMessagingService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessagingService {
    pub fn new() -> Self {
        Self::with_partitions(defaults::TOPIC_PARTITIONS)
    }

    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            partitions: partitions.max(1),
            sequence: AtomicU64::new(0),
            failing_topics: parking_lot::RwLock::new(HashSet::new()),
        }
    }

    /// Make every send to `topic` fail until cleared (for testing)
    pub fn set_send_failure(&self, topic: &str, failing: bool) {
        let mut failing_topics = self.failing_topics.write();
        if failing {
            failing_topics.insert(topic.to_string());
        } else {
            failing_topics.remove(topic);
        }
    }

    /// Number of messages ever sent to a topic (for testing)
    pub async fn message_count(&self, topic: &str) -> usize {
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .map(|t| t.partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Every message sent to a topic, decoded, in send order (for testing)
    pub async fn messages<T: QueueMessage>(
        &self,
        topic: &str,
    ) -> Result<Vec<(String, T)>, MessagingError> {
        let topics = self.topics.read().await;
        let topic_log = topics
            .get(topic)
            .ok_or_else(|| MessagingError::topic_not_found(topic))?;

        let mut stored: Vec<&StoredMessage> = topic_log.partitions.iter().flatten().collect();
        stored.sort_by_key(|m| m.sequence);
        stored
            .into_iter()
            .map(|m| Ok((m.key.clone(), T::from_bytes(&m.payload)?)))
            .collect()
    }
}

#[async_trait]
impl MessagingService for InMemoryMessagingService {
    async fn ensure_topic(&self, topic: &str) -> Result<(), MessagingError> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| InMemoryTopic::new(self.partitions));
        Ok(())
    }

    async fn send_keyed(
        &self,
        topic: &str,
        key: &str,
        payload: Vec<u8>,
    ) -> Result<MessageId, MessagingError> {
        let failing = self.failing_topics.read().contains(topic);
        if failing {
            return Err(MessagingError::topic_operation(
                topic,
                "send",
                "topic is configured to reject sends",
            ));
        }

        let mut topics = self.topics.write().await;
        let topic_log = topics
            .get_mut(topic)
            .ok_or_else(|| MessagingError::topic_not_found(topic))?;

        let partition = topic_log.partition_for(key);
        let offset = topic_log.partitions[partition].len();
        topic_log.partitions[partition].push(StoredMessage {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            key: key.to_string(),
            payload,
            enqueued_at: Utc::now(),
        });
        topic_log.total_sent += 1;

        Ok(MessageId::new(format!("{partition}:{offset}")))
    }

    async fn receive(
        &self,
        topic: &str,
        group: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, MessagingError> {
        let mut topics = self.topics.write().await;
        let topic_log = topics
            .get_mut(topic)
            .ok_or_else(|| MessagingError::topic_not_found(topic))?;

        let now = Instant::now();
        let partition_count = topic_log.partitions.len();
        let cursors = topic_log
            .groups
            .entry(group.to_string())
            .or_insert_with(|| (0..partition_count).map(|_| PartitionCursor::default()).collect());
        let mut received = Vec::new();

        'partitions: for (partition, log) in topic_log.partitions.iter().enumerate() {
            let cursor = &mut cursors[partition];
            for (offset, stored) in log.iter().enumerate().skip(cursor.low_water) {
                if received.len() >= max_messages {
                    break 'partitions;
                }
                if cursor.settled.contains(&offset) {
                    continue;
                }
                let receive_count = match cursor.in_flight.get(&offset) {
                    Some(delivery) if delivery.visible_at > now => continue,
                    Some(delivery) => delivery.receive_count + 1,
                    None => 1,
                };
                cursor.in_flight.insert(
                    offset,
                    Delivery {
                        receive_count,
                        visible_at: now + visibility_timeout,
                    },
                );
                received.push(ReceivedMessage {
                    receipt_handle: ReceiptHandle::new(format!("{partition}:{offset}")),
                    key: stored.key.clone(),
                    partition,
                    payload: stored.payload.clone(),
                    receive_count,
                    enqueued_at: stored.enqueued_at,
                });
            }
        }

        Ok(received)
    }

    async fn ack(
        &self,
        topic: &str,
        group: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        let (partition, offset) = parse_receipt(topic, receipt_handle)?;
        let mut topics = self.topics.write().await;
        let topic_log = topics
            .get_mut(topic)
            .ok_or_else(|| MessagingError::topic_not_found(topic))?;

        let settled = topic_log
            .groups
            .get_mut(group)
            .and_then(|cursors| cursors.get_mut(partition))
            .filter(|cursor| cursor.in_flight.contains_key(&offset))
            .map(|cursor| cursor.settle(offset))
            .unwrap_or(false);

        if !settled {
            return Err(MessagingError::receipt_not_found(topic, receipt_handle.as_str()));
        }
        topic_log.total_acked += 1;
        Ok(())
    }

    async fn nack(
        &self,
        topic: &str,
        group: &str,
        receipt_handle: &ReceiptHandle,
        requeue: bool,
    ) -> Result<(), MessagingError> {
        let (partition, offset) = parse_receipt(topic, receipt_handle)?;
        let mut topics = self.topics.write().await;
        let topic_log = topics
            .get_mut(topic)
            .ok_or_else(|| MessagingError::topic_not_found(topic))?;

        let cursor = topic_log
            .groups
            .get_mut(group)
            .and_then(|cursors| cursors.get_mut(partition))
            .filter(|cursor| cursor.in_flight.contains_key(&offset))
            .ok_or_else(|| MessagingError::receipt_not_found(topic, receipt_handle.as_str()))?;

        if requeue {
            if let Some(delivery) = cursor.in_flight.get_mut(&offset) {
                delivery.visible_at = Instant::now();
            }
        } else {
            cursor.settle(offset);
            topic_log.total_rejected += 1;
        }
        Ok(())
    }

    async fn topic_stats(&self, topic: &str) -> Result<TopicStats, MessagingError> {
        let topics = self.topics.read().await;
        let topic_log = topics
            .get(topic)
            .ok_or_else(|| MessagingError::topic_not_found(topic))?;

        let in_flight_count = topic_log
            .groups
            .values()
            .flatten()
            .map(|cursor| cursor.in_flight.len() as u64)
            .sum();

        Ok(TopicStats {
            topic: topic.to_string(),
            partitions: topic_log.partitions.len(),
            total_sent: topic_log.total_sent,
            total_acked: topic_log.total_acked,
            total_rejected: topic_log.total_rejected,
            in_flight_count,
        })
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
