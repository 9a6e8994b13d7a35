//! # System Constants
//!
//! Identifiers, metadata keys and default limits shared across the batch
//! operation pipeline.

/// Operation type identifiers used as handler registry keys
pub mod operation_types {
    pub const BATCH_COMMAND_INVOCATION: &str = "BatchCommandInvocation";
}

/// Handler kinds understood by the handler factory
pub mod handler_kinds {
    pub const BATCH_COMMAND_INVOCATION: &str = "batch_command_invocation";
}

/// Well-known keys in operation parameters and element metadata
pub mod keys {
    /// Operation parameter naming the command to invoke
    pub const COMMAND_TOKEN: &str = "commandToken";
    /// Element metadata entry recording the resulting invocation
    pub const INVOCATION_ID: &str = "invocationId";
    /// Element metadata entry recording a failure message
    pub const FAILURE_REASON: &str = "failureReason";
}

/// Topic suffixes appended to the tenant topic prefix
pub mod topics {
    pub const UNPROCESSED_BATCH_OPERATIONS: &str = "unprocessed-batch-operations";
    pub const UNPROCESSED_BATCH_ELEMENTS: &str = "unprocessed-batch-elements";
    pub const FAILED_BATCH_ELEMENTS: &str = "failed-batch-elements";
}

/// Default operational limits
pub mod defaults {
    pub const WORKER_POOL_SIZE: usize = 10;
    pub const WORKER_QUEUE_CAPACITY: usize = 1000;
    pub const THROTTLE_DELAY_MS: u64 = 0;
    pub const HANDLER_TIMEOUT_MS: u64 = 30_000;
    pub const CONSUMER_BATCH_SIZE: usize = 10;
    pub const CONSUMER_POLL_INTERVAL_MS: u64 = 100;
    pub const CONSUMER_VISIBILITY_TIMEOUT_MS: u64 = 30_000;
    pub const CONSUMER_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;
    pub const CONSUMER_GROUP: &str = "batch-operations";
    pub const TOPIC_PARTITIONS: usize = 8;
    pub const PRODUCT_ID: &str = "sitewhere";
    pub const INSTANCE_ID: &str = "default";
    pub const TENANT_TOKEN: &str = "default";
    pub const SYSTEM_PRINCIPAL: &str = "system";
}
