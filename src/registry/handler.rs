//! # Batch Operation Handler
//!
//! Execution contract for one element of a given operation type.

use async_trait::async_trait;

use crate::error::BatchResult;
use crate::models::{BatchElement, BatchElementUpdateRequest, BatchOperation, ElementProcessingStatus};
use crate::orchestration::context::TaskContext;

/// Pluggable per-operation-type element logic
///
/// `process` returns the element's terminal status and may add entries to
/// `update.metadata`, which are persisted with it. Errors, panics and
/// timeouts are all recorded as `Failed` by the caller.
///
/// Lifecycle hooks follow the owning manager: `initialize` during manager
/// initialization, `start` after the consumers are running, `stop` after
/// they have stopped.
#[async_trait]
pub trait BatchOperationHandler: Send + Sync + 'static {
    /// Handler name for logging
    fn name(&self) -> &str;

    async fn initialize(&self, _ctx: &TaskContext) -> BatchResult<()> {
        Ok(())
    }

    async fn start(&self, _ctx: &TaskContext) -> BatchResult<()> {
        Ok(())
    }

    async fn stop(&self, _ctx: &TaskContext) -> BatchResult<()> {
        Ok(())
    }

    async fn process(
        &self,
        ctx: &TaskContext,
        operation: &BatchOperation,
        element: &BatchElement,
        update: &mut BatchElementUpdateRequest,
    ) -> BatchResult<ElementProcessingStatus>;
}
