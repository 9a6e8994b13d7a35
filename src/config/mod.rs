//! # Configuration
//!
//! Typed configuration for the batch operation pipeline. Every field carries a
//! default so a partial TOML file or a handful of environment variables is
//! enough to override what matters.
//!
//! ```toml
//! [worker_pool]
//! size = 10
//! queue_capacity = 1000
//!
//! [throttle]
//! delay_ms = 250
//!
//! [topics]
//! product_id = "sitewhere"
//! instance_id = "prod"
//! tenant_token = "acme"
//!
//! [[handlers]]
//! operation_type = "BatchCommandInvocation"
//! kind = "batch_command_invocation"
//! ```

mod error;
mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::{ConfigLoader, CONFIG_PATH_ENV, ENV_PREFIX};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{defaults, handler_kinds, operation_types};

/// Root configuration for a tenant's batch operations engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOperationsConfig {
    pub worker_pool: WorkerPoolConfig,
    pub throttle: ThrottleConfig,
    pub processing: ProcessingConfig,
    pub consumers: ConsumerConfig,
    pub topics: TopicConfig,
    /// Handlers registered with the manager at construction time
    pub handlers: Vec<HandlerRegistrationConfig>,
}

/// One entry of the handler registration table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerRegistrationConfig {
    pub operation_type: String,
    pub kind: String,
}

impl Default for BatchOperationsConfig {
    fn default() -> Self {
        let handlers = vec![HandlerRegistrationConfig {
            operation_type: operation_types::BATCH_COMMAND_INVOCATION.to_string(),
            kind: handler_kinds::BATCH_COMMAND_INVOCATION.to_string(),
        }];

        Self {
            worker_pool: WorkerPoolConfig::default(),
            throttle: ThrottleConfig::default(),
            processing: ProcessingConfig::default(),
            consumers: ConsumerConfig::default(),
            topics: TopicConfig::default(),
            handlers,
        }
    }
}

impl BatchOperationsConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker_pool.size == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker_pool.size",
                self.worker_pool.size,
                "worker pool needs at least one worker",
            ));
        }
        if self.worker_pool.queue_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker_pool.queue_capacity",
                self.worker_pool.queue_capacity,
                "job queue capacity must be positive",
            ));
        }
        if self.processing.handler_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "processing.handler_timeout_ms",
                self.processing.handler_timeout_ms,
                "handler timeout must be positive",
            ));
        }
        if self.consumers.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "consumers.batch_size",
                self.consumers.batch_size,
                "consumer batch size must be positive",
            ));
        }
        if self.consumers.consumer_group.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "consumers.consumer_group",
                &self.consumers.consumer_group,
                "consumer group must not be empty",
            ));
        }
        if self.topics.partitions == 0 {
            return Err(ConfigurationError::invalid_value(
                "topics.partitions",
                self.topics.partitions,
                "topics need at least one partition",
            ));
        }
        for (field, value) in [
            ("topics.product_id", &self.topics.product_id),
            ("topics.instance_id", &self.topics.instance_id),
            ("topics.tenant_token", &self.topics.tenant_token),
        ] {
            if value.trim().is_empty() || value.contains('.') {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value,
                    "topic segments must be non-empty and contain no '.'",
                ));
            }
        }
        for registration in &self.handlers {
            if registration.operation_type.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    "handlers.operation_type",
                    &registration.operation_type,
                    "operation type must not be empty",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers; fixed for the lifetime of a started pool
    pub size: usize,
    /// Jobs that may wait for a worker before submitters are back-pressured
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            size: defaults::WORKER_POOL_SIZE,
            queue_capacity: defaults::WORKER_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Initial delay inserted at every processing checkpoint
    pub delay_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            delay_ms: defaults::THROTTLE_DELAY_MS,
        }
    }
}

impl ThrottleConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub handler_timeout_ms: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: defaults::HANDLER_TIMEOUT_MS,
        }
    }
}

impl ProcessingConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub visibility_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub consumer_group: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::CONSUMER_BATCH_SIZE,
            poll_interval_ms: defaults::CONSUMER_POLL_INTERVAL_MS,
            visibility_timeout_ms: defaults::CONSUMER_VISIBILITY_TIMEOUT_MS,
            shutdown_timeout_ms: defaults::CONSUMER_SHUTDOWN_TIMEOUT_MS,
            consumer_group: defaults::CONSUMER_GROUP.to_string(),
        }
    }
}

impl ConsumerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub product_id: String,
    pub instance_id: String,
    pub tenant_token: String,
    pub partitions: usize,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            product_id: defaults::PRODUCT_ID.to_string(),
            instance_id: defaults::INSTANCE_ID.to_string(),
            tenant_token: defaults::TENANT_TOKEN.to_string(),
            partitions: defaults::TOPIC_PARTITIONS,
        }
    }
}
