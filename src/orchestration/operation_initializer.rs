//! # Operation Initializer
//!
//! Initialization stage: expands one unprocessed operation into per-device
//! elements and queues each for processing.
//!
//! ## Flow
//!
//! 1. Mark the operation `Initializing`. A redelivered operation that has
//!    already left `Created` is skipped.
//! 2. For every device token, create an `Unprocessed` element and publish it
//!    keyed by device id. Tokens whose element cannot be created are sent to
//!    the failed-elements topic instead.
//! 3. Mark the operation `InitializedSuccessfully`, or
//!    `InitializedWithErrors` when any element creation failed.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::BatchResult;
use crate::logging::{log_element_event, log_error, log_operation_event};
use crate::messaging::{BatchChannels, UnprocessedBatchElement, UnprocessedBatchOperation};
use crate::models::{
    BatchElementCreateRequest, BatchOperation, BatchOperationStatus, BatchOperationUpdateRequest,
};
use crate::orchestration::context::TaskContext;
use crate::orchestration::control::ProcessingControl;
use crate::persistence::BatchManagement;

/// Summary of one initialization run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializationOutcome {
    /// Elements created and persisted
    pub created: usize,
    /// Device tokens sent to the failed-elements topic
    pub failed: usize,
    /// Created elements whose processing message could not be published
    pub publish_failures: usize,
    pub final_status: BatchOperationStatus,
}

pub struct OperationInitializer {
    management: Arc<dyn BatchManagement>,
    channels: BatchChannels,
    control: Arc<ProcessingControl>,
}

impl std::fmt::Debug for OperationInitializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationInitializer")
            .field("channels", &self.channels)
            .field("control", &self.control)
            .finish()
    }
}

impl OperationInitializer {
    pub fn new(
        management: Arc<dyn BatchManagement>,
        channels: BatchChannels,
        control: Arc<ProcessingControl>,
    ) -> Self {
        Self {
            management,
            channels,
            control,
        }
    }

    /// Returns `None` when the operation was already initialized by an
    /// earlier delivery
    #[instrument(skip_all, fields(operation_token = %payload.batch_operation.token))]
    pub async fn initialize(
        &self,
        ctx: &TaskContext,
        payload: UnprocessedBatchOperation,
    ) -> BatchResult<Option<InitializationOutcome>> {
        let UnprocessedBatchOperation {
            batch_operation,
            device_tokens,
        } = payload;

        let started = BatchOperationUpdateRequest {
            processing_status: Some(BatchOperationStatus::Initializing),
            processing_started_date: Some(Utc::now()),
            ..Default::default()
        };
        let operation = match self
            .management
            .update_batch_operation(batch_operation.id, &started)
            .await
        {
            Ok(operation) => operation,
            Err(err) if err.is_stale_transition() => {
                debug!(
                    tenant = %ctx.tenant_token(),
                    error = %err,
                    "Batch operation already initialized, skipping redelivery"
                );
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        info!(
            tenant = %ctx.tenant_token(),
            operation_type = %operation.operation_type,
            device_count = device_tokens.len(),
            "Initializing batch operation"
        );

        let mut outcome = InitializationOutcome {
            created: 0,
            failed: 0,
            publish_failures: 0,
            final_status: BatchOperationStatus::Initializing,
        };

        for device_token in device_tokens {
            self.control.checkpoint().await;
            self.initialize_element(&operation, device_token, &mut outcome)
                .await;
        }

        let final_status = if outcome.failed == 0 {
            BatchOperationStatus::InitializedSuccessfully
        } else {
            BatchOperationStatus::InitializedWithErrors
        };
        let finished = BatchOperationUpdateRequest {
            processing_status: Some(final_status),
            processing_ended_date: Some(Utc::now()),
            ..Default::default()
        };
        self.management
            .update_batch_operation(operation.id, &finished)
            .await?;
        outcome.final_status = final_status;

        let details = format!(
            "created={} failed={} publish_failures={}",
            outcome.created, outcome.failed, outcome.publish_failures
        );
        log_operation_event(
            "initialized",
            &operation.token,
            Some(&operation.operation_type),
            &final_status.to_string(),
            Some(&details),
        );
        Ok(Some(outcome))
    }

    async fn initialize_element(
        &self,
        operation: &BatchOperation,
        device_token: String,
        outcome: &mut InitializationOutcome,
    ) {
        let request = BatchElementCreateRequest::unprocessed(device_token);
        match self
            .management
            .create_batch_element(operation.id, &request)
            .await
        {
            Ok(element) => {
                outcome.created += 1;
                let payload = UnprocessedBatchElement {
                    batch_element: element,
                };
                match self.channels.publish_unprocessed_element(&payload).await {
                    Ok(_) => log_element_event(
                        "queued",
                        &operation.token,
                        &request.device_token,
                        "unprocessed",
                        None,
                    ),
                    Err(err) => {
                        // The element stays Unprocessed and is visible through progress queries
                        outcome.publish_failures += 1;
                        log_error(
                            "operation_initializer",
                            "publish_unprocessed_element",
                            &err.to_string(),
                            Some(&request.device_token),
                        );
                    }
                }
            }
            Err(err) => {
                outcome.failed += 1;
                warn!(
                    operation_token = %operation.token,
                    device_token = %request.device_token,
                    error = %err,
                    "Unable to create batch element, sending to failed elements"
                );
                if let Err(publish_err) = self.channels.publish_failed_element(&request).await {
                    log_error(
                        "operation_initializer",
                        "publish_failed_element",
                        &publish_err.to_string(),
                        Some(&request.device_token),
                    );
                }
            }
        }
    }
}
