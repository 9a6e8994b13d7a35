//! # Batch Operation Manager
//!
//! Façade over the three pipeline stages for one tenant. Owns the worker pool
//! shared by submission, initialization and processing jobs, the handler
//! registry, the pause/throttle control and the two bus consumers.
//!
//! ## Usage
//!
//! ```rust
//! use batch_ops_core::config::BatchOperationsConfig;
//! use batch_ops_core::messaging::InMemoryMessagingService;
//! use batch_ops_core::models::BatchCommandInvocationRequest;
//! use batch_ops_core::orchestration::BatchOperationManager;
//! use batch_ops_core::persistence::InMemoryBatchManagement;
//! use batch_ops_core::registry::{HandlerDependencies, LoggingCommandInvoker};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let deps = HandlerDependencies::default()
//!     .with_command_invoker(Arc::new(LoggingCommandInvoker));
//! let manager = Arc::new(BatchOperationManager::from_config(
//!     BatchOperationsConfig::default(),
//!     Arc::new(InMemoryBatchManagement::new()),
//!     Arc::new(InMemoryMessagingService::new()),
//!     &deps,
//! )?);
//!
//! manager.initialize().await?;
//! manager.start().await?;
//!
//! let operation = manager
//!     .create_batch_command_invocation(&BatchCommandInvocationRequest {
//!         token: Some("op-1".to_string()),
//!         command_token: "reboot".to_string(),
//!         parameter_values: Default::default(),
//!         device_tokens: vec!["d1".to_string(), "d2".to_string()],
//!     })
//!     .await?;
//! let progress = manager.operation_progress(operation.id).await?;
//! println!("{} of {} elements done", progress.succeeded + progress.failed, progress.total);
//!
//! manager.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::BatchOperationsConfig;
use crate::error::{BatchError, BatchResult};
use crate::logging::log_error;
use crate::messaging::{MessagingService, UnprocessedBatchElement, UnprocessedBatchOperation};
use crate::models::{
    BatchCommandInvocationRequest, BatchElementSearchCriteria, BatchOperation,
    BatchOperationCreateRequest, BatchOperationProgress,
};
use crate::orchestration::consumers::{BatchConsumer, ConsumerKind};
use crate::orchestration::context::BatchContext;
use crate::orchestration::control::ProcessingControl;
use crate::orchestration::element_processor::ElementProcessor;
use crate::orchestration::lifecycle::LifecycleStatus;
use crate::orchestration::operation_creator::OperationCreator;
use crate::orchestration::operation_initializer::OperationInitializer;
use crate::orchestration::worker_pool::{JobKind, WorkerPool, WorkerPoolStats};
use crate::persistence::BatchManagement;
use crate::registry::{BatchOperationHandler, HandlerDependencies, HandlerFactory, HandlerRegistry};

const POOL_NAME: &str = "batch-operations";
const COMPONENT: &str = "batch_operation_manager";

pub struct BatchOperationManager {
    context: Arc<BatchContext>,
    registry: Arc<HandlerRegistry>,
    control: Arc<ProcessingControl>,
    creator: Arc<OperationCreator>,
    initializer: Arc<OperationInitializer>,
    processor: Arc<ElementProcessor>,
    pool: RwLock<Option<Arc<WorkerPool>>>,
    consumers: Mutex<Vec<Arc<BatchConsumer>>>,
    status: RwLock<LifecycleStatus>,
    initialized: AtomicBool,
}

impl std::fmt::Debug for BatchOperationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOperationManager")
            .field("status", &self.lifecycle_status())
            .field("registry", &self.registry)
            .field("control", &self.control)
            .field("pool", &self.pool_stats())
            .finish()
    }
}

impl BatchOperationManager {
    /// Manager with an empty handler registry
    pub fn new(context: BatchContext) -> Self {
        let context = Arc::new(context);
        let registry = Arc::new(HandlerRegistry::new());
        let control = Arc::new(ProcessingControl::new(context.config.throttle.delay()));

        let creator = Arc::new(OperationCreator::new(context.channels.clone()));
        let initializer = Arc::new(OperationInitializer::new(
            Arc::clone(&context.management),
            context.channels.clone(),
            Arc::clone(&control),
        ));
        let processor = Arc::new(ElementProcessor::new(
            Arc::clone(&context.management),
            Arc::clone(&registry),
            Arc::clone(&control),
            context.config.processing.handler_timeout(),
        ));

        Self {
            context,
            registry,
            control,
            creator,
            initializer,
            processor,
            pool: RwLock::new(None),
            consumers: Mutex::new(Vec::new()),
            status: RwLock::new(LifecycleStatus::Stopped),
            initialized: AtomicBool::new(false),
        }
    }

    /// Validate the configuration, build the context and register the
    /// configured handlers
    pub fn from_config(
        config: BatchOperationsConfig,
        management: Arc<dyn BatchManagement>,
        messaging: Arc<dyn MessagingService>,
        deps: &HandlerDependencies,
    ) -> BatchResult<Self> {
        config.validate()?;
        let registrations = config.handlers.clone();
        let manager = Self::new(BatchContext::new(config, management, messaging));
        HandlerFactory::with_builtins().populate(&manager.registry, &registrations, deps)?;
        Ok(manager)
    }

    pub fn context(&self) -> &Arc<BatchContext> {
        &self.context
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Allowed before and after `start`. A handler added to an initialized
    /// manager is initialized first, and started too when the manager is
    /// running, so it never sees `stop` without `start`. A replaced handler
    /// that was running is stopped.
    pub async fn register_handler(
        &self,
        operation_type: impl Into<String>,
        handler: Arc<dyn BatchOperationHandler>,
    ) -> BatchResult<Option<Arc<dyn BatchOperationHandler>>> {
        let ctx = self.context.task_context();
        let running = self.lifecycle_status().is_running();
        if self.initialized.load(Ordering::Acquire) {
            handler.initialize(&ctx).await?;
        }
        if running {
            handler.start(&ctx).await?;
        }

        let previous = self.registry.register(operation_type, handler);
        if let Some(replaced) = previous.as_ref().filter(|_| running) {
            if let Err(e) = replaced.stop(&ctx).await {
                warn!(handler = replaced.name(), error = %e, "Replaced handler failed to stop cleanly");
            }
        }
        Ok(previous)
    }

    pub fn lifecycle_status(&self) -> LifecycleStatus {
        *self.status.read()
    }

    fn set_status(&self, status: LifecycleStatus) {
        let previous = std::mem::replace(&mut *self.status.write(), status);
        if previous != status {
            info!(from = %previous, to = %status, "Batch operation manager lifecycle changed");
        }
    }

    /// Ensure the pipeline topics exist and initialize every registered handler
    pub async fn initialize(&self) -> BatchResult<()> {
        let current = self.lifecycle_status();
        if current.is_running() || current == LifecycleStatus::Starting {
            return Err(BatchError::InvalidState(format!(
                "cannot initialize a manager that is {current}"
            )));
        }

        self.set_status(LifecycleStatus::Initializing);
        let ctx = self.context.task_context();
        let result = async {
            self.context.channels.ensure_topics().await?;
            self.registry.initialize_all(&ctx).await
        }
        .await;

        match result {
            Ok(()) => {
                self.initialized.store(true, Ordering::Release);
                self.set_status(LifecycleStatus::Initialized);
                Ok(())
            }
            Err(e) => {
                log_error(COMPONENT, "initialize", &e.to_string(), None);
                self.set_status(LifecycleStatus::Error);
                Err(e)
            }
        }
    }

    /// Start a fresh worker pool, the two consumers, then the handlers.
    ///
    /// Calling `start` on a running manager replaces the pipeline: the old
    /// consumers and pool are shut down before the new ones are built, and
    /// handlers keep running without a second `start` hook.
    pub async fn start(self: &Arc<Self>) -> BatchResult<()> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(BatchError::InvalidState(
                "batch operation manager must be initialized before it is started".to_string(),
            ));
        }
        let current = self.lifecycle_status();
        if matches!(current, LifecycleStatus::Starting | LifecycleStatus::Stopping) {
            return Err(BatchError::InvalidState(format!(
                "batch operation manager is {current}"
            )));
        }
        let restarting = current.is_running();
        self.set_status(LifecycleStatus::Starting);

        if restarting {
            warn!("Replacing the running worker pool and consumers");
        }
        self.shutdown_pipeline().await;

        let settings = &self.context.config;
        let pool = Arc::new(WorkerPool::start(
            POOL_NAME,
            settings.worker_pool.size,
            settings.worker_pool.queue_capacity,
        ));
        *self.pool.write() = Some(pool);

        let topics = self.context.channels.topics();
        let consumers = vec![
            Arc::new(BatchConsumer::new(
                ConsumerKind::UnprocessedOperations,
                topics.unprocessed_batch_operations(),
                settings.consumers.clone(),
                Arc::clone(self.context.channels.messaging()),
                Arc::downgrade(self),
            )),
            Arc::new(BatchConsumer::new(
                ConsumerKind::UnprocessedElements,
                topics.unprocessed_batch_elements(),
                settings.consumers.clone(),
                Arc::clone(self.context.channels.messaging()),
                Arc::downgrade(self),
            )),
        ];
        for consumer in &consumers {
            consumer.start()?;
        }
        *self.consumers.lock() = consumers;

        if !restarting {
            if let Err(e) = self.registry.start_all(&self.context.task_context()).await {
                log_error(COMPONENT, "start", &e.to_string(), None);
                self.set_status(LifecycleStatus::Error);
                return Err(e);
            }
        }

        self.set_status(if self.control.is_paused() {
            LifecycleStatus::Paused
        } else {
            LifecycleStatus::Started
        });
        Ok(())
    }

    /// Shut the pool down immediately, stop the consumers, then the handlers.
    /// Queued jobs are discarded and running jobs are interrupted.
    pub async fn stop(&self) -> BatchResult<()> {
        self.set_status(LifecycleStatus::Stopping);
        self.shutdown_pipeline().await;
        self.registry.stop_all(&self.context.task_context()).await;
        self.set_status(LifecycleStatus::Stopped);
        Ok(())
    }

    /// Signal the consumers, abort the pool, then wait a bounded time for the
    /// consumer loops to exit
    async fn shutdown_pipeline(&self) {
        let consumers = std::mem::take(&mut *self.consumers.lock());
        for consumer in &consumers {
            consumer.signal_stop();
        }

        let pool = self.pool.write().take();
        if let Some(pool) = pool {
            pool.shutdown_now();
        }

        let timeout = self.context.config.consumers.shutdown_timeout();
        for consumer in &consumers {
            consumer.stop(timeout).await;
        }
    }

    pub fn pause(&self) {
        if self.control.pause() {
            let mut status = self.status.write();
            if *status == LifecycleStatus::Started {
                *status = LifecycleStatus::Paused;
            }
        }
    }

    pub fn resume(&self) {
        if self.control.resume() {
            let mut status = self.status.write();
            if *status == LifecycleStatus::Paused {
                *status = LifecycleStatus::Started;
            }
        }
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub fn set_throttle_delay(&self, delay: Duration) {
        self.control.set_throttle_delay(delay);
    }

    pub fn throttle_delay(&self) -> Duration {
        self.control.throttle_delay()
    }

    /// `None` while no pool is running
    pub fn pool_stats(&self) -> Option<WorkerPoolStats> {
        self.pool.read().as_ref().map(|pool| pool.stats())
    }

    async fn execute<F>(&self, kind: JobKind, job: F) -> BatchResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let pool = self
            .pool
            .read()
            .clone()
            .ok_or_else(|| BatchError::PoolShutdown(format!("{POOL_NAME} (not started)")))?;
        pool.execute(kind, job).await
    }

    /// Queue a submission job. Failures inside the job are logged.
    pub async fn submit(
        &self,
        batch_operation: BatchOperation,
        device_tokens: Vec<String>,
    ) -> BatchResult<()> {
        let creator = Arc::clone(&self.creator);
        let ctx = self.context.task_context();
        self.execute(JobKind::Submission, async move {
            let token = batch_operation.token.clone();
            if let Err(e) = creator.submit(&ctx, batch_operation, device_tokens).await {
                log_error(COMPONENT, "submit", &e.to_string(), Some(&token));
            }
        })
        .await
    }

    /// Queue an initialization job for a message from the unprocessed
    /// operations topic
    pub async fn on_unprocessed_operation(&self, payload: UnprocessedBatchOperation) -> BatchResult<()> {
        let initializer = Arc::clone(&self.initializer);
        let ctx = self.context.task_context();
        self.execute(JobKind::Initialization, async move {
            let token = payload.batch_operation.token.clone();
            if let Err(e) = initializer.initialize(&ctx, payload).await {
                log_error(COMPONENT, "initialize_operation", &e.to_string(), Some(&token));
            }
        })
        .await
    }

    /// Queue a processing job for a message from the unprocessed elements topic
    pub async fn on_unprocessed_element(&self, payload: UnprocessedBatchElement) -> BatchResult<()> {
        let processor = Arc::clone(&self.processor);
        let ctx = self.context.task_context();
        self.execute(JobKind::Processing, async move {
            let device_token = payload.batch_element.device_token.clone();
            if let Err(e) = processor.process(&ctx, payload).await {
                log_error(COMPONENT, "process_element", &e.to_string(), Some(&device_token));
            }
        })
        .await
    }

    /// Persist a new operation and queue it for submission
    pub async fn create_batch_operation(
        &self,
        request: &BatchOperationCreateRequest,
        device_tokens: Vec<String>,
    ) -> BatchResult<BatchOperation> {
        let operation = self.context.management.create_batch_operation(request).await?;
        self.submit(operation.clone(), device_tokens).await?;
        Ok(operation)
    }

    pub async fn create_batch_command_invocation(
        &self,
        request: &BatchCommandInvocationRequest,
    ) -> BatchResult<BatchOperation> {
        let operation = self
            .context
            .management
            .create_batch_command_invocation(request)
            .await?;
        self.submit(operation.clone(), request.device_tokens.clone()).await?;
        Ok(operation)
    }

    pub async fn operation_progress(&self, batch_operation_id: Uuid) -> BatchResult<BatchOperationProgress> {
        let elements = self
            .context
            .management
            .list_batch_elements(batch_operation_id, &BatchElementSearchCriteria::default())
            .await?;
        Ok(BatchOperationProgress::from_elements(&elements))
    }
}
