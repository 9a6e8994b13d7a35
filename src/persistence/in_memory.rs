//! # In-Memory Batch Management
//!
//! `BatchManagement` over `parking_lot`-guarded maps. Uniqueness and status
//! transition rules are enforced under a single write lock, so concurrent
//! claims of the same element resolve to exactly one winner.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::BatchManagement;
use crate::error::{BatchError, BatchResult};
use crate::models::{
    BatchElement, BatchElementCreateRequest, BatchElementSearchCriteria,
    BatchElementUpdateRequest, BatchOperation, BatchOperationCreateRequest,
    BatchOperationSearchCriteria, BatchOperationStatus, BatchOperationUpdateRequest,
};

/// How device tokens resolve to device ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceResolution {
    /// Unknown tokens are registered on first use
    #[default]
    AutoRegister,
    /// Unknown tokens are rejected with `InvalidDeviceToken`
    Strict,
}

#[derive(Debug, Default)]
struct Store {
    operations: HashMap<Uuid, BatchOperation>,
    operation_tokens: HashMap<String, Uuid>,
    elements: HashMap<Uuid, BatchElement>,
    /// (operation id, device token) -> element id
    element_index: HashMap<(Uuid, String), Uuid>,
    devices: HashMap<String, Uuid>,
}

#[derive(Debug, Default)]
pub struct InMemoryBatchManagement {
    store: RwLock<Store>,
    device_resolution: DeviceResolution,
}

impl InMemoryBatchManagement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that only accepts devices registered up front
    pub fn with_strict_devices<I, S>(device_tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let management = Self {
            store: RwLock::new(Store::default()),
            device_resolution: DeviceResolution::Strict,
        };
        for token in device_tokens {
            management.register_device(token);
        }
        management
    }

    /// Register a device token, returning its id
    pub fn register_device(&self, device_token: impl Into<String>) -> Uuid {
        let mut store = self.store.write();
        *store
            .devices
            .entry(device_token.into())
            .or_insert_with(Uuid::new_v4)
    }

    pub fn device_id(&self, device_token: &str) -> Option<Uuid> {
        self.store.read().devices.get(device_token).copied()
    }

    pub fn operation_count(&self) -> usize {
        self.store.read().operations.len()
    }

    pub fn element_count(&self) -> usize {
        self.store.read().elements.len()
    }

    fn resolve_device(&self, store: &mut Store, device_token: &str) -> BatchResult<Uuid> {
        if let Some(id) = store.devices.get(device_token) {
            return Ok(*id);
        }
        match self.device_resolution {
            DeviceResolution::Strict => Err(BatchError::InvalidDeviceToken(device_token.to_string())),
            DeviceResolution::AutoRegister => {
                let id = Uuid::new_v4();
                store.devices.insert(device_token.to_string(), id);
                Ok(id)
            }
        }
    }
}

fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Vec<T> {
    if page_size == 0 {
        return items;
    }
    let skip = page.saturating_sub(1).saturating_mul(page_size);
    items.into_iter().skip(skip).take(page_size).collect()
}

#[async_trait]
impl BatchManagement for InMemoryBatchManagement {
    async fn create_batch_operation(
        &self,
        request: &BatchOperationCreateRequest,
    ) -> BatchResult<BatchOperation> {
        if request.operation_type.trim().is_empty() {
            return Err(BatchError::Validation(
                "batch operation requires an operation type".to_string(),
            ));
        }

        let mut store = self.store.write();
        let token = request
            .token
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if store.operation_tokens.contains_key(&token) {
            return Err(BatchError::DuplicateBatchOperationToken(token));
        }

        let operation = BatchOperation {
            id: Uuid::new_v4(),
            token: token.clone(),
            operation_type: request.operation_type.clone(),
            parameters: request.parameters.clone(),
            metadata: request.metadata.clone(),
            processing_status: BatchOperationStatus::Created,
            processing_started_date: None,
            processing_ended_date: None,
            created_date: Utc::now(),
        };
        store.operation_tokens.insert(token, operation.id);
        store.operations.insert(operation.id, operation.clone());

        debug!(operation_id = %operation.id, token = %operation.token, "Created batch operation");
        Ok(operation)
    }

    async fn update_batch_operation(
        &self,
        id: Uuid,
        request: &BatchOperationUpdateRequest,
    ) -> BatchResult<BatchOperation> {
        let mut store = self.store.write();
        let operation = store
            .operations
            .get_mut(&id)
            .ok_or(BatchError::InvalidBatchOperationId(id))?;

        if let Some(next) = request.processing_status {
            if !operation.processing_status.can_transition_to(next) {
                return Err(BatchError::invalid_transition(
                    "batch operation",
                    operation.processing_status,
                    next,
                ));
            }
            operation.processing_status = next;
        }
        if let Some(started) = request.processing_started_date {
            operation.processing_started_date = Some(started);
        }
        if let Some(ended) = request.processing_ended_date {
            operation.processing_ended_date = Some(ended);
        }
        if let Some(metadata) = &request.metadata {
            operation.metadata = metadata.clone();
        }

        Ok(operation.clone())
    }

    async fn get_batch_operation(&self, id: Uuid) -> BatchResult<Option<BatchOperation>> {
        Ok(self.store.read().operations.get(&id).cloned())
    }

    async fn get_batch_operation_by_token(
        &self,
        token: &str,
    ) -> BatchResult<Option<BatchOperation>> {
        let store = self.store.read();
        Ok(store
            .operation_tokens
            .get(token)
            .and_then(|id| store.operations.get(id))
            .cloned())
    }

    async fn list_batch_operations(
        &self,
        criteria: &BatchOperationSearchCriteria,
    ) -> BatchResult<Vec<BatchOperation>> {
        let mut operations: Vec<BatchOperation> =
            self.store.read().operations.values().cloned().collect();
        operations.sort_by(|a, b| b.created_date.cmp(&a.created_date));
        Ok(paginate(operations, criteria.page, criteria.page_size))
    }

    async fn delete_batch_operation(&self, id: Uuid) -> BatchResult<BatchOperation> {
        let mut store = self.store.write();
        let operation = store
            .operations
            .remove(&id)
            .ok_or(BatchError::InvalidBatchOperationId(id))?;
        store.operation_tokens.remove(&operation.token);
        store.elements.retain(|_, element| element.batch_operation_id != id);
        store.element_index.retain(|(operation_id, _), _| *operation_id != id);
        Ok(operation)
    }

    async fn create_batch_element(
        &self,
        batch_operation_id: Uuid,
        request: &BatchElementCreateRequest,
    ) -> BatchResult<BatchElement> {
        let mut store = self.store.write();
        if !store.operations.contains_key(&batch_operation_id) {
            return Err(BatchError::InvalidBatchOperationId(batch_operation_id));
        }
        let index_key = (batch_operation_id, request.device_token.clone());
        if store.element_index.contains_key(&index_key) {
            return Err(BatchError::DuplicateBatchElement {
                batch_operation_id,
                device_token: request.device_token.clone(),
            });
        }
        let device_id = self.resolve_device(&mut store, &request.device_token)?;

        let element = BatchElement {
            id: Uuid::new_v4(),
            batch_operation_id,
            device_token: request.device_token.clone(),
            device_id,
            processing_status: request.processing_status,
            processed_date: request.processed_date,
            metadata: request.metadata.clone(),
            created_date: Utc::now(),
        };
        store.element_index.insert(index_key, element.id);
        store.elements.insert(element.id, element.clone());
        Ok(element)
    }

    async fn update_batch_element(
        &self,
        id: Uuid,
        request: &BatchElementUpdateRequest,
    ) -> BatchResult<BatchElement> {
        let mut store = self.store.write();
        let element = store
            .elements
            .get_mut(&id)
            .ok_or(BatchError::InvalidBatchElementId(id))?;

        if let Some(next) = request.processing_status {
            if !element.processing_status.can_transition_to(next) {
                return Err(BatchError::invalid_transition(
                    "batch element",
                    element.processing_status,
                    next,
                ));
            }
            element.processing_status = next;
        }
        if let Some(processed) = request.processed_date {
            element.processed_date = Some(processed);
        }
        element
            .metadata
            .extend(request.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(element.clone())
    }

    async fn get_batch_element(&self, id: Uuid) -> BatchResult<Option<BatchElement>> {
        Ok(self.store.read().elements.get(&id).cloned())
    }

    async fn list_batch_elements(
        &self,
        batch_operation_id: Uuid,
        criteria: &BatchElementSearchCriteria,
    ) -> BatchResult<Vec<BatchElement>> {
        let store = self.store.read();
        if !store.operations.contains_key(&batch_operation_id) {
            return Err(BatchError::InvalidBatchOperationId(batch_operation_id));
        }
        let mut elements: Vec<BatchElement> = store
            .elements
            .values()
            .filter(|element| element.batch_operation_id == batch_operation_id)
            .filter(|element| {
                criteria
                    .processing_status
                    .map_or(true, |status| element.processing_status == status)
            })
            .cloned()
            .collect();
        elements.sort_by(|a, b| {
            a.created_date
                .cmp(&b.created_date)
                .then_with(|| a.device_token.cmp(&b.device_token))
        });
        Ok(paginate(elements, criteria.page, criteria.page_size))
    }
}
