//! # Operation Creator
//!
//! Submission stage: hands a persisted operation and its device list to the
//! bus, keyed by operation token.

use tracing::debug;

use crate::error::BatchResult;
use crate::logging::log_operation_event;
use crate::messaging::{BatchChannels, UnprocessedBatchOperation};
use crate::models::BatchOperation;
use crate::orchestration::context::TaskContext;

#[derive(Debug, Clone)]
pub struct OperationCreator {
    channels: BatchChannels,
}

impl OperationCreator {
    pub fn new(channels: BatchChannels) -> Self {
        Self { channels }
    }

    /// Publish the operation for initialization. On failure the operation
    /// stays `Created`; there is no retry.
    pub async fn submit(
        &self,
        ctx: &TaskContext,
        batch_operation: BatchOperation,
        device_tokens: Vec<String>,
    ) -> BatchResult<()> {
        let token = batch_operation.token.clone();
        let device_count = device_tokens.len();
        let payload = UnprocessedBatchOperation {
            batch_operation,
            device_tokens,
        };

        self.channels.publish_unprocessed_operation(&payload).await?;

        debug!(
            tenant = %ctx.tenant_token(),
            operation_token = %token,
            device_count = device_count,
            "Batch operation submitted"
        );
        log_operation_event(
            "submitted",
            &token,
            Some(&payload.batch_operation.operation_type),
            "queued",
            None,
        );
        Ok(())
    }
}
