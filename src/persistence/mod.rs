//! # Batch Management
//!
//! Persistence contract for batch operations and their elements. Production
//! deployments supply their own store; [`InMemoryBatchManagement`] backs tests
//! and single-process runs.

pub mod in_memory;

pub use in_memory::InMemoryBatchManagement;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::BatchResult;
use crate::models::{
    BatchCommandInvocationRequest, BatchElement, BatchElementCreateRequest,
    BatchElementSearchCriteria, BatchElementUpdateRequest, BatchOperation,
    BatchOperationCreateRequest, BatchOperationSearchCriteria, BatchOperationUpdateRequest,
};

/// Stores are expected to:
/// - keep operation tokens unique;
/// - keep at most one element per (operation, device);
/// - reject status updates that move an operation or element backwards, which
///   is what makes element claiming safe under duplicate delivery.
#[async_trait]
pub trait BatchManagement: Send + Sync + 'static {
    async fn create_batch_operation(
        &self,
        request: &BatchOperationCreateRequest,
    ) -> BatchResult<BatchOperation>;

    async fn update_batch_operation(
        &self,
        id: Uuid,
        request: &BatchOperationUpdateRequest,
    ) -> BatchResult<BatchOperation>;

    async fn get_batch_operation(&self, id: Uuid) -> BatchResult<Option<BatchOperation>>;

    async fn get_batch_operation_by_token(&self, token: &str)
        -> BatchResult<Option<BatchOperation>>;

    /// Newest first
    async fn list_batch_operations(
        &self,
        criteria: &BatchOperationSearchCriteria,
    ) -> BatchResult<Vec<BatchOperation>>;

    /// Removes the operation together with its elements
    async fn delete_batch_operation(&self, id: Uuid) -> BatchResult<BatchOperation>;

    async fn create_batch_element(
        &self,
        batch_operation_id: Uuid,
        request: &BatchElementCreateRequest,
    ) -> BatchResult<BatchElement>;

    async fn update_batch_element(
        &self,
        id: Uuid,
        request: &BatchElementUpdateRequest,
    ) -> BatchResult<BatchElement>;

    async fn get_batch_element(&self, id: Uuid) -> BatchResult<Option<BatchElement>>;

    async fn list_batch_elements(
        &self,
        batch_operation_id: Uuid,
        criteria: &BatchElementSearchCriteria,
    ) -> BatchResult<Vec<BatchElement>>;

    /// Records a command invocation operation, generating a token when the
    /// request carries none
    async fn create_batch_command_invocation(
        &self,
        request: &BatchCommandInvocationRequest,
    ) -> BatchResult<BatchOperation> {
        let token = request
            .token
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.create_batch_operation(&request.to_operation_request(token))
            .await
    }
}
