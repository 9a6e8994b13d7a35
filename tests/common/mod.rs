#![allow(dead_code)]

pub mod handlers;
pub mod strategies;

pub use handlers::*;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use batch_ops_core::config::BatchOperationsConfig;
use batch_ops_core::messaging::{BatchChannels, InMemoryMessagingService};
use batch_ops_core::models::{
    BatchElement, BatchElementSearchCriteria, BatchOperation, BatchOperationCreateRequest,
    BatchOperationProgress,
};
use batch_ops_core::orchestration::BatchOperationManager;
use batch_ops_core::persistence::{BatchManagement, InMemoryBatchManagement};
use batch_ops_core::registry::{CommandInvoker, HandlerDependencies, LoggingCommandInvoker};
use uuid::Uuid;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Defaults with short polling so pipeline tests finish quickly
pub fn fast_config() -> BatchOperationsConfig {
    let mut config = BatchOperationsConfig::default();
    config.consumers.poll_interval_ms = 10;
    config.consumers.shutdown_timeout_ms = 1_000;
    config.topics.tenant_token = "test-tenant".to_string();
    config
}

pub struct TestHarness {
    pub manager: Arc<BatchOperationManager>,
    pub management: Arc<InMemoryBatchManagement>,
    pub messaging: Arc<InMemoryMessagingService>,
}

impl TestHarness {
    pub fn build(
        config: BatchOperationsConfig,
        management: InMemoryBatchManagement,
        invoker: Arc<dyn CommandInvoker>,
    ) -> Self {
        let management = Arc::new(management);
        let messaging = Arc::new(InMemoryMessagingService::new());
        let deps = HandlerDependencies::default().with_command_invoker(invoker);
        let manager = Arc::new(
            BatchOperationManager::from_config(config, management.clone(), messaging.clone(), &deps)
                .expect("manager builds from test configuration"),
        );
        Self {
            manager,
            management,
            messaging,
        }
    }

    /// Built, initialized and started with the default in-memory collaborators
    pub async fn started() -> Self {
        Self::started_with(fast_config(), InMemoryBatchManagement::new()).await
    }

    pub async fn started_with(config: BatchOperationsConfig, management: InMemoryBatchManagement) -> Self {
        let harness = Self::build(config, management, Arc::new(LoggingCommandInvoker));
        harness.start().await;
        harness
    }

    pub async fn start(&self) {
        self.manager.initialize().await.expect("manager initializes");
        self.manager.start().await.expect("manager starts");
    }

    pub fn channels(&self) -> &BatchChannels {
        &self.manager.context().channels
    }

    pub async fn create(&self, token: &str, operation_type: &str, devices: &[&str]) -> BatchOperation {
        self.manager
            .create_batch_operation(
                &BatchOperationCreateRequest::new(token, operation_type),
                device_tokens(devices),
            )
            .await
            .expect("batch operation is created and submitted")
    }

    pub async fn operation(&self, id: Uuid) -> BatchOperation {
        self.management
            .get_batch_operation(id)
            .await
            .unwrap()
            .expect("operation exists")
    }

    /// Stored elements in creation order
    pub async fn elements(&self, id: Uuid) -> Vec<BatchElement> {
        self.management
            .list_batch_elements(id, &BatchElementSearchCriteria::default())
            .await
            .unwrap()
    }

    /// Wait until initialization has finished and every element is terminal
    pub async fn wait_for_completion(&self, id: Uuid) -> BatchOperationProgress {
        let manager = Arc::clone(&self.manager);
        let management = Arc::clone(&self.management);
        wait_for(move || {
            let manager = Arc::clone(&manager);
            let management = Arc::clone(&management);
            async move {
                let initialized = management
                    .get_batch_operation(id)
                    .await
                    .ok()
                    .flatten()
                    .is_some_and(|op| op.processing_status.is_terminal());
                let progress = manager.operation_progress(id).await.ok()?;
                (initialized && progress.is_complete()).then_some(progress)
            }
        })
        .await
    }
}

pub fn device_tokens(devices: &[&str]) -> Vec<String> {
    devices.iter().map(|d| d.to_string()).collect()
}

/// Poll `check` until it yields a value, panicking after [`WAIT_TIMEOUT`]
pub async fn wait_for<T, F, Fut>(check: F) -> T
where
    F: Fn() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            if let Some(value) = check().await {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

pub async fn wait_until(condition: impl Fn() -> bool) {
    wait_for(|| {
        let done = condition();
        async move { done.then_some(()) }
    })
    .await
}
