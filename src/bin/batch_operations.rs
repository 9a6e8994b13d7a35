//! # Batch Operations Runner
//!
//! Runs one command invocation batch end to end against the in-memory bus and
//! store, then prints the element progress summary.
//!
//! Usage: `batch-operations [COMMAND_TOKEN] [DEVICE_TOKEN...]`
//!
//! Configuration is read from `BATCH_OPS_CONFIG_PATH` (optional TOML file) and
//! `BATCH_OPS_*` environment variables.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use batch_ops_core::config::ConfigLoader;
use batch_ops_core::logging::init_structured_logging;
use batch_ops_core::messaging::InMemoryMessagingService;
use batch_ops_core::models::{BatchCommandInvocationRequest, BatchOperationProgress};
use batch_ops_core::orchestration::BatchOperationManager;
use batch_ops_core::persistence::{BatchManagement, InMemoryBatchManagement};
use batch_ops_core::registry::{HandlerDependencies, LoggingCommandInvoker};
use tracing::info;

const COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);
const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    init_structured_logging();

    let mut args = std::env::args().skip(1);
    let command_token = args.next().unwrap_or_else(|| "ping".to_string());
    let mut device_tokens: Vec<String> = args.collect();
    if device_tokens.is_empty() {
        device_tokens = (1..=3).map(|i| format!("device-{i}")).collect();
    }

    let config = ConfigLoader::from_env()
        .load()
        .context("failed to load batch operations configuration")?;
    info!(
        workers = config.worker_pool.size,
        throttle_delay_ms = config.throttle.delay_ms,
        tenant = %config.topics.tenant_token,
        "Configuration loaded"
    );

    let partitions = config.topics.partitions;
    let management = Arc::new(InMemoryBatchManagement::new());
    let deps = HandlerDependencies::default().with_command_invoker(Arc::new(LoggingCommandInvoker));
    let manager = Arc::new(
        BatchOperationManager::from_config(
            config,
            management.clone(),
            Arc::new(InMemoryMessagingService::with_partitions(partitions)),
            &deps,
        )
        .context("failed to build batch operation manager")?,
    );

    manager.initialize().await?;
    manager.start().await?;

    let operation = manager
        .create_batch_command_invocation(&BatchCommandInvocationRequest {
            token: None,
            command_token,
            parameter_values: Default::default(),
            device_tokens: device_tokens.clone(),
        })
        .await?;
    info!(operation_token = %operation.token, devices = device_tokens.len(), "Batch submitted");

    let progress = wait_for_completion(&manager, operation.id).await?;
    manager.stop().await?;

    let stored = management
        .get_batch_operation(operation.id)
        .await?
        .context("batch operation disappeared from the store")?;

    println!("operation:  {}", stored.token);
    println!("status:     {}", stored.processing_status);
    println!("elements:   {}", progress.total);
    println!("succeeded:  {}", progress.succeeded);
    println!("failed:     {}", progress.failed);
    println!("pending:    {}", progress.unprocessed + progress.processing);
    Ok(())
}

async fn wait_for_completion(
    manager: &BatchOperationManager,
    operation_id: uuid::Uuid,
) -> Result<BatchOperationProgress> {
    let deadline = tokio::time::Instant::now() + COMPLETION_TIMEOUT;
    loop {
        if let Some(progress) = completed_progress(manager, operation_id).await? {
            return Ok(progress);
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timed out waiting for the batch to complete");
        }
        tokio::time::sleep(PROGRESS_POLL_INTERVAL).await;
    }
}

/// Progress once initialization has finished and every element is terminal
async fn completed_progress(
    manager: &BatchOperationManager,
    operation_id: uuid::Uuid,
) -> Result<Option<BatchOperationProgress>> {
    let initialized = manager
        .context()
        .management
        .get_batch_operation(operation_id)
        .await?
        .is_some_and(|operation| operation.processing_status.is_terminal());
    let progress = manager.operation_progress(operation_id).await?;
    Ok((initialized && progress.is_complete()).then_some(progress))
}
