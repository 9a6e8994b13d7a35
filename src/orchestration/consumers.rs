//! # Batch Consumers
//!
//! Polling loops that move messages from the two inbound topics onto the
//! manager's worker pool.
//!
//! A message is acknowledged once its job has been queued. Messages that
//! cannot be decoded are rejected without requeue so they are not redelivered
//! forever. When the pool has shut down the message is left unacknowledged and
//! the loop exits; the bus redelivers it after the visibility timeout.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConsumerConfig;
use crate::error::{BatchError, BatchResult};
use crate::logging::log_error;
use crate::messaging::{
    MessagingError, MessagingService, ReceivedMessage, UnprocessedBatchElement,
    UnprocessedBatchOperation,
};
use crate::orchestration::manager::BatchOperationManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumerKind {
    /// Feeds the initialization stage
    UnprocessedOperations,
    /// Feeds the processing stage
    UnprocessedElements,
}

impl fmt::Display for ConsumerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnprocessedOperations => write!(f, "unprocessed_operations"),
            Self::UnprocessedElements => write!(f, "unprocessed_elements"),
        }
    }
}

/// What the loop does after handling one message
enum Flow {
    Continue,
    Stop,
}

pub struct BatchConsumer {
    kind: ConsumerKind,
    topic: String,
    settings: ConsumerConfig,
    messaging: Arc<dyn MessagingService>,
    /// Weak so a running consumer never keeps its manager alive
    manager: Weak<BatchOperationManager>,
    running: AtomicBool,
    shutdown_notify: Notify,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for BatchConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConsumer")
            .field("kind", &self.kind)
            .field("topic", &self.topic)
            .field("running", &self.is_running())
            .finish()
    }
}

impl BatchConsumer {
    pub fn new(
        kind: ConsumerKind,
        topic: String,
        settings: ConsumerConfig,
        messaging: Arc<dyn MessagingService>,
        manager: Weak<BatchOperationManager>,
    ) -> Self {
        Self {
            kind,
            topic,
            settings,
            messaging,
            manager,
            running: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
            handle: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> ConsumerKind {
        self.kind
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn start(self: &Arc<Self>) -> BatchResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(BatchError::InvalidState(format!(
                "{} consumer is already running",
                self.kind
            )));
        }
        let consumer = Arc::clone(self);
        let handle = tokio::spawn(async move { consumer.run().await });
        *self.handle.lock() = Some(handle);
        info!(consumer = %self.kind, topic = %self.topic, "Batch consumer started");
        Ok(())
    }

    /// Ask the loop to exit without waiting for it
    pub fn signal_stop(&self) {
        self.running.store(false, Ordering::Release);
        self.shutdown_notify.notify_waiters();
    }

    /// Stop the loop, aborting it if it has not exited within `timeout`
    pub async fn stop(&self, timeout: Duration) {
        self.signal_stop();
        let handle = self.handle.lock().take();
        let Some(mut handle) = handle else {
            return;
        };
        if tokio::time::timeout(timeout, &mut handle).await.is_err() {
            warn!(consumer = %self.kind, "Consumer did not stop in time, aborting");
            handle.abort();
        }
        info!(consumer = %self.kind, "Batch consumer stopped");
    }

    async fn run(&self) {
        debug!(consumer = %self.kind, group = %self.settings.consumer_group, "Consumer loop running");

        while self.is_running() {
            let Some(manager) = self.manager.upgrade() else {
                warn!(consumer = %self.kind, "Manager dropped, consumer exiting");
                break;
            };

            let received = self
                .messaging
                .receive(
                    &self.topic,
                    &self.settings.consumer_group,
                    self.settings.batch_size,
                    self.settings.visibility_timeout(),
                )
                .await;

            let messages = match received {
                Ok(messages) => messages,
                Err(e) => {
                    log_error("batch_consumer", "receive", &e.to_string(), Some(&self.topic));
                    Vec::new()
                }
            };

            if messages.is_empty() {
                drop(manager);
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.poll_interval()) => {},
                    _ = self.shutdown_notify.notified() => {
                        debug!(consumer = %self.kind, "Shutdown notification received");
                        break;
                    }
                }
                continue;
            }

            let mut stop = false;
            for message in messages {
                if let Flow::Stop = self.dispatch(&manager, message).await {
                    stop = true;
                    break;
                }
            }
            if stop {
                break;
            }
        }

        self.running.store(false, Ordering::Release);
        debug!(consumer = %self.kind, "Consumer loop ended");
    }

    async fn dispatch(&self, manager: &Arc<BatchOperationManager>, message: ReceivedMessage) -> Flow {
        let queued = match self.kind {
            ConsumerKind::UnprocessedOperations => {
                match message.decode::<UnprocessedBatchOperation>() {
                    Ok(decoded) => manager.on_unprocessed_operation(decoded.message).await,
                    Err(e) => return self.reject(&message, e).await,
                }
            }
            ConsumerKind::UnprocessedElements => {
                match message.decode::<UnprocessedBatchElement>() {
                    Ok(decoded) => manager.on_unprocessed_element(decoded.message).await,
                    Err(e) => return self.reject(&message, e).await,
                }
            }
        };

        match queued {
            Ok(()) => {
                if let Err(e) = self
                    .messaging
                    .ack(&self.topic, &self.settings.consumer_group, &message.receipt_handle)
                    .await
                {
                    log_error("batch_consumer", "ack", &e.to_string(), Some(&message.key));
                }
                Flow::Continue
            }
            Err(BatchError::PoolShutdown(_)) => {
                debug!(consumer = %self.kind, key = %message.key, "Worker pool closed, leaving message for redelivery");
                Flow::Stop
            }
            Err(e) => {
                log_error("batch_consumer", "dispatch", &e.to_string(), Some(&message.key));
                if let Err(e) = self
                    .messaging
                    .nack(&self.topic, &self.settings.consumer_group, &message.receipt_handle, true)
                    .await
                {
                    log_error("batch_consumer", "nack", &e.to_string(), Some(&message.key));
                }
                Flow::Continue
            }
        }
    }

    async fn reject(&self, message: &ReceivedMessage, error: MessagingError) -> Flow {
        log_error(
            "batch_consumer",
            "decode",
            &error.to_string(),
            Some(&format!("topic={} key={}", self.topic, message.key)),
        );
        let requeue = !error.is_poison();
        if let Err(e) = self
            .messaging
            .nack(&self.topic, &self.settings.consumer_group, &message.receipt_handle, requeue)
            .await
        {
            log_error("batch_consumer", "nack", &e.to_string(), Some(&message.key));
        }
        Flow::Continue
    }
}
