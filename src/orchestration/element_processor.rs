//! # Element Processor
//!
//! Processing stage: claims one unprocessed element, runs the handler
//! registered for its operation type and records the terminal status.
//!
//! The claim is a store-level `Unprocessed -> Processing` transition, so a
//! redelivered or concurrently delivered element message reaches the handler
//! at most once. Handler errors, panics, timeouts and non-terminal results are
//! all recorded as `Failed` with a `failureReason` metadata entry.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, instrument, warn};

use crate::constants::keys;
use crate::error::{BatchError, BatchResult};
use crate::logging::log_element_event;
use crate::messaging::UnprocessedBatchElement;
use crate::models::{BatchElement, BatchElementUpdateRequest, ElementProcessingStatus};
use crate::orchestration::context::TaskContext;
use crate::orchestration::control::ProcessingControl;
use crate::persistence::BatchManagement;
use crate::registry::HandlerRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Element had already been claimed; carries the status found
    Skipped(ElementProcessingStatus),
    /// Handler ran (or could not be run) and the terminal status was stored
    Completed(ElementProcessingStatus),
}

pub struct ElementProcessor {
    management: Arc<dyn BatchManagement>,
    registry: Arc<HandlerRegistry>,
    control: Arc<ProcessingControl>,
    handler_timeout: Duration,
}

impl std::fmt::Debug for ElementProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementProcessor")
            .field("registry", &self.registry)
            .field("handler_timeout", &self.handler_timeout)
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl ElementProcessor {
    pub fn new(
        management: Arc<dyn BatchManagement>,
        registry: Arc<HandlerRegistry>,
        control: Arc<ProcessingControl>,
        handler_timeout: Duration,
    ) -> Self {
        Self {
            management,
            registry,
            control,
            handler_timeout,
        }
    }

    #[instrument(skip_all, fields(
        element_id = %payload.batch_element.id,
        device_token = %payload.batch_element.device_token
    ))]
    pub async fn process(
        &self,
        ctx: &TaskContext,
        payload: UnprocessedBatchElement,
    ) -> BatchResult<ProcessingOutcome> {
        let element_id = payload.batch_element.id;
        let operation_id = payload.batch_element.batch_operation_id;

        let operation = self
            .management
            .get_batch_operation(operation_id)
            .await?
            .ok_or(BatchError::InvalidBatchOperationId(operation_id))?;

        // The bus copy may be stale; the stored status decides
        let current = self
            .management
            .get_batch_element(element_id)
            .await?
            .ok_or(BatchError::InvalidBatchElementId(element_id))?;
        if current.processing_status != ElementProcessingStatus::Unprocessed {
            debug!(status = %current.processing_status, "Element already claimed, skipping");
            return Ok(ProcessingOutcome::Skipped(current.processing_status));
        }

        // Claim before waiting so in-flight work is visible while paused
        let claimed = match self
            .management
            .update_batch_element(
                element_id,
                &BatchElementUpdateRequest::status(ElementProcessingStatus::Processing),
            )
            .await
        {
            Ok(element) => element,
            Err(err) if err.is_stale_transition() => {
                debug!(error = %err, "Lost element claim to another delivery");
                let status = self
                    .management
                    .get_batch_element(element_id)
                    .await?
                    .map(|element| element.processing_status)
                    .unwrap_or(ElementProcessingStatus::Processing);
                return Ok(ProcessingOutcome::Skipped(status));
            }
            Err(err) => return Err(err),
        };

        self.control.checkpoint().await;

        let mut update = BatchElementUpdateRequest::default();
        let status = match self.registry.get(&operation.operation_type) {
            Some(handler) => {
                let outcome = tokio::time::timeout(
                    self.handler_timeout,
                    AssertUnwindSafe(handler.process(ctx, &operation, &claimed, &mut update))
                        .catch_unwind(),
                )
                .await;
                match outcome {
                    Ok(Ok(Ok(status))) if status.is_terminal() => status,
                    Ok(Ok(Ok(status))) => {
                        Self::failed(&mut update, format!("handler returned non-terminal status {status}"))
                    }
                    Ok(Ok(Err(err))) => Self::failed(&mut update, err.to_string()),
                    Ok(Err(panic)) => Self::failed(
                        &mut update,
                        format!("handler panicked: {}", panic_message(panic.as_ref())),
                    ),
                    Err(_) => Self::failed(
                        &mut update,
                        format!("handler timed out after {}ms", self.handler_timeout.as_millis()),
                    ),
                }
            }
            None => Self::failed(
                &mut update,
                BatchError::HandlerNotFound(operation.operation_type.clone()).to_string(),
            ),
        };

        update.processing_status = Some(status);
        update.processed_date = Some(Utc::now());
        let stored = self.management.update_batch_element(element_id, &update).await?;
        self.log_result(&operation.token, &stored);
        Ok(ProcessingOutcome::Completed(status))
    }

    fn failed(update: &mut BatchElementUpdateRequest, reason: String) -> ElementProcessingStatus {
        warn!(reason = %reason, "Batch element failed");
        update
            .metadata
            .insert(keys::FAILURE_REASON.to_string(), reason);
        ElementProcessingStatus::Failed
    }

    fn log_result(&self, operation_token: &str, element: &BatchElement) {
        log_element_event(
            "processed",
            operation_token,
            &element.device_token,
            &element.processing_status.to_string(),
            element
                .metadata
                .get(keys::FAILURE_REASON)
                .map(String::as_str),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BatchElementCreateRequest, BatchOperation, BatchOperationCreateRequest};
    use crate::orchestration::context::SystemPrincipal;
    use crate::persistence::InMemoryBatchManagement;
    use crate::registry::BatchOperationHandler;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Succeed,
        Fail,
        Panic,
        Hang,
        Unfinished,
    }

    struct ScriptedHandler {
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl ScriptedHandler {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl BatchOperationHandler for ScriptedHandler {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn process(
            &self,
            _ctx: &TaskContext,
            _operation: &BatchOperation,
            _element: &BatchElement,
            update: &mut BatchElementUpdateRequest,
        ) -> BatchResult<ElementProcessingStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => {
                    update.metadata.insert("handled".to_string(), "yes".to_string());
                    Ok(ElementProcessingStatus::Succeeded)
                }
                Behavior::Fail => Err(BatchError::handler("Test", "device offline")),
                Behavior::Panic => panic!("handler exploded"),
                Behavior::Hang => {
                    futures::future::pending::<()>().await;
                    Ok(ElementProcessingStatus::Succeeded)
                }
                Behavior::Unfinished => Ok(ElementProcessingStatus::Processing),
            }
        }
    }

    struct Fixture {
        management: Arc<InMemoryBatchManagement>,
        registry: Arc<HandlerRegistry>,
        processor: ElementProcessor,
        ctx: TaskContext,
    }

    fn fixture(timeout: Duration) -> Fixture {
        let management = Arc::new(InMemoryBatchManagement::new());
        let registry = Arc::new(HandlerRegistry::new());
        let processor = ElementProcessor::new(
            management.clone(),
            Arc::clone(&registry),
            Arc::new(ProcessingControl::default()),
            timeout,
        );
        Fixture {
            management,
            registry,
            processor,
            ctx: TaskContext::new(SystemPrincipal::system("t")),
        }
    }

    async fn element(fixture: &Fixture, operation_type: &str) -> UnprocessedBatchElement {
        let operation = fixture
            .management
            .create_batch_operation(&BatchOperationCreateRequest::new("op-1", operation_type))
            .await
            .unwrap();
        let element = fixture
            .management
            .create_batch_element(operation.id, &BatchElementCreateRequest::unprocessed("d1"))
            .await
            .unwrap();
        UnprocessedBatchElement {
            batch_element: element,
        }
    }

    async fn stored(fixture: &Fixture, payload: &UnprocessedBatchElement) -> BatchElement {
        fixture
            .management
            .get_batch_element(payload.batch_element.id)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_is_recorded_with_handler_metadata() {
        let fixture = fixture(Duration::from_secs(5));
        let handler = ScriptedHandler::new(Behavior::Succeed);
        fixture.registry.register("Reboot", handler.clone());
        let payload = element(&fixture, "Reboot").await;

        let outcome = fixture.processor.process(&fixture.ctx, payload.clone()).await.unwrap();
        assert_eq!(outcome, ProcessingOutcome::Completed(ElementProcessingStatus::Succeeded));

        let element = stored(&fixture, &payload).await;
        assert_eq!(element.processing_status, ElementProcessingStatus::Succeeded);
        assert!(element.processed_date.is_some());
        assert_eq!(element.metadata.get("handled").map(String::as_str), Some("yes"));
    }

    #[tokio::test]
    async fn test_redelivery_does_not_invoke_handler_twice() {
        let fixture = fixture(Duration::from_secs(5));
        let handler = ScriptedHandler::new(Behavior::Succeed);
        fixture.registry.register("Reboot", handler.clone());
        let payload = element(&fixture, "Reboot").await;

        fixture.processor.process(&fixture.ctx, payload.clone()).await.unwrap();
        let second = fixture.processor.process(&fixture.ctx, payload).await.unwrap();

        assert_eq!(second, ProcessingOutcome::Skipped(ElementProcessingStatus::Succeeded));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_handler_marks_element_failed() {
        let fixture = fixture(Duration::from_secs(5));
        let payload = element(&fixture, "Unknown").await;

        let outcome = fixture.processor.process(&fixture.ctx, payload.clone()).await.unwrap();
        assert_eq!(outcome, ProcessingOutcome::Completed(ElementProcessingStatus::Failed));

        let element = stored(&fixture, &payload).await;
        assert!(element.metadata["failureReason"].contains("Unknown"));
    }

    #[tokio::test]
    async fn test_handler_error_marks_element_failed() {
        let fixture = fixture(Duration::from_secs(5));
        fixture.registry.register("Reboot", ScriptedHandler::new(Behavior::Fail));
        let payload = element(&fixture, "Reboot").await;

        fixture.processor.process(&fixture.ctx, payload.clone()).await.unwrap();
        let element = stored(&fixture, &payload).await;
        assert_eq!(element.processing_status, ElementProcessingStatus::Failed);
        assert!(element.metadata["failureReason"].contains("device offline"));
    }

    #[tokio::test]
    async fn test_handler_panic_marks_element_failed() {
        let fixture = fixture(Duration::from_secs(5));
        fixture.registry.register("Reboot", ScriptedHandler::new(Behavior::Panic));
        let payload = element(&fixture, "Reboot").await;

        let outcome = fixture.processor.process(&fixture.ctx, payload.clone()).await.unwrap();
        assert_eq!(outcome, ProcessingOutcome::Completed(ElementProcessingStatus::Failed));
        let element = stored(&fixture, &payload).await;
        assert!(element.metadata["failureReason"].contains("handler exploded"));
    }

    #[tokio::test]
    async fn test_handler_timeout_marks_element_failed() {
        let fixture = fixture(Duration::from_millis(50));
        fixture.registry.register("Reboot", ScriptedHandler::new(Behavior::Hang));
        let payload = element(&fixture, "Reboot").await;

        fixture.processor.process(&fixture.ctx, payload.clone()).await.unwrap();
        let element = stored(&fixture, &payload).await;
        assert_eq!(element.processing_status, ElementProcessingStatus::Failed);
        assert!(element.metadata["failureReason"].contains("timed out"));
    }

    #[tokio::test]
    async fn test_non_terminal_result_is_failed() {
        let fixture = fixture(Duration::from_secs(5));
        fixture.registry.register("Reboot", ScriptedHandler::new(Behavior::Unfinished));
        let payload = element(&fixture, "Reboot").await;

        fixture.processor.process(&fixture.ctx, payload.clone()).await.unwrap();
        let element = stored(&fixture, &payload).await;
        assert_eq!(element.processing_status, ElementProcessingStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_element_is_an_error() {
        let fixture = fixture(Duration::from_secs(5));
        let mut payload = element(&fixture, "Reboot").await;
        payload.batch_element.id = uuid::Uuid::new_v4();

        let err = fixture.processor.process(&fixture.ctx, payload).await.unwrap_err();
        assert!(matches!(err, BatchError::InvalidBatchElementId(_)));
    }
}
