//! Manager lifecycle: initialize, start, stop, restart and handler hooks

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use batch_ops_core::error::BatchError;
use batch_ops_core::messaging::UnprocessedBatchOperation;
use batch_ops_core::models::{BatchOperationCreateRequest, BatchOperationStatus};
use batch_ops_core::orchestration::LifecycleStatus;
use batch_ops_core::persistence::{BatchManagement, InMemoryBatchManagement};
use batch_ops_core::registry::LoggingCommandInvoker;
use common::*;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_stopped_manager_rejects_submissions() {
    let harness = TestHarness::started().await;
    harness.manager.register_handler("Count", Arc::new(CountingHandler::new())).await.unwrap();
    assert_ok!(harness.manager.stop().await);
    assert_eq!(harness.manager.lifecycle_status(), LifecycleStatus::Stopped);

    let err = harness
        .manager
        .create_batch_operation(
            &BatchOperationCreateRequest::new("op-late", "Count"),
            device_tokens(&["d1"]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::PoolShutdown(_)));
}

#[tokio::test]
async fn test_restart_replaces_the_worker_pool() {
    let harness = TestHarness::started().await;
    let handler = Arc::new(CountingHandler::new());
    harness.manager.register_handler("Count", handler.clone()).await.unwrap();

    let first = harness.create("op-before", "Count", &["d1", "d2"]).await;
    harness.wait_for_completion(first.id).await;
    // submission + initialization + 2 elements
    let manager = Arc::clone(&harness.manager);
    wait_until(move || manager.pool_stats().is_some_and(|s| s.completed_jobs == 4)).await;

    assert_ok!(harness.manager.stop().await);
    assert!(harness.manager.pool_stats().is_none());

    assert_ok!(harness.manager.start().await);
    assert_eq!(harness.manager.lifecycle_status(), LifecycleStatus::Started);
    let stats = harness.manager.pool_stats().unwrap();
    assert_eq!(stats.completed_jobs, 0);
    assert_eq!(stats.workers, 10);

    let second = harness.create("op-after", "Count", &["d3"]).await;
    let progress = harness.wait_for_completion(second.id).await;
    assert_eq!(progress.succeeded, 1);
    assert_eq!(handler.calls(), 3);
}

#[tokio::test]
async fn test_handler_hooks_follow_manager_lifecycle() {
    let harness = TestHarness::build(
        fast_config(),
        InMemoryBatchManagement::new(),
        Arc::new(LoggingCommandInvoker),
    );
    let handler = Arc::new(LifecycleHandler::default());
    harness.manager.register_handler("Hooks", handler.clone()).await.unwrap();

    assert_ok!(harness.manager.initialize().await);
    assert_eq!(handler.initialized.load(Ordering::SeqCst), 1);
    assert_eq!(handler.started.load(Ordering::SeqCst), 0);

    assert_ok!(harness.manager.start().await);
    assert_eq!(handler.started.load(Ordering::SeqCst), 1);

    assert_ok!(harness.manager.stop().await);
    assert_eq!(handler.stopped.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_handler_initialization_puts_manager_in_error() {
    let harness = TestHarness::build(
        fast_config(),
        InMemoryBatchManagement::new(),
        Arc::new(LoggingCommandInvoker),
    );
    assert_ok!(
        harness
            .manager
            .register_handler(
                "Hooks",
                Arc::new(LifecycleHandler {
                    fail_initialize: true,
                    ..Default::default()
                }),
            )
            .await
    );

    assert_err!(harness.manager.initialize().await);
    assert_eq!(harness.manager.lifecycle_status(), LifecycleStatus::Error);

    let err = harness.manager.start().await.unwrap_err();
    assert!(matches!(err, BatchError::InvalidState(_)));
}

#[tokio::test]
async fn test_handler_registered_after_start_is_used() {
    let harness = TestHarness::started().await;

    let handler = Arc::new(CountingHandler::new());
    let previous = harness.manager.register_handler("Late", handler.clone()).await;
    assert!(assert_ok!(previous).is_none());

    let operation = harness.create("op-late-handler", "Late", &["d1", "d2"]).await;
    let progress = harness.wait_for_completion(operation.id).await;
    assert_eq!(progress.succeeded, 2);
    assert_eq!(handler.calls(), 2);
}

#[tokio::test]
async fn test_handler_registered_while_running_gets_every_hook() {
    let harness = TestHarness::started().await;

    let handler = Arc::new(LifecycleHandler::default());
    assert_ok!(harness.manager.register_handler("Hooks", handler.clone()).await);
    assert_eq!(handler.events(), vec!["initialize", "start"]);

    let replacement = Arc::new(LifecycleHandler::default());
    let previous = harness.manager.register_handler("Hooks", replacement.clone()).await;
    assert!(assert_ok!(previous).is_some());
    assert_eq!(handler.events(), vec!["initialize", "start", "stop"]);
    assert_eq!(replacement.events(), vec!["initialize", "start"]);

    assert_ok!(harness.manager.stop().await);
    assert_eq!(replacement.events(), vec!["initialize", "start", "stop"]);
    assert_eq!(handler.stopped.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handler_registered_while_stopped_starts_with_the_manager() {
    let harness = TestHarness::started().await;
    assert_ok!(harness.manager.stop().await);

    let handler = Arc::new(LifecycleHandler::default());
    assert_ok!(harness.manager.register_handler("Hooks", handler.clone()).await);
    assert_eq!(handler.events(), vec!["initialize"]);

    assert_ok!(harness.manager.start().await);
    assert_eq!(handler.events(), vec!["initialize", "start"]);
}

#[tokio::test]
async fn test_second_start_keeps_handlers_running_and_serving() {
    let harness = TestHarness::started().await;
    let hooks = Arc::new(LifecycleHandler::default());
    let counting = Arc::new(CountingHandler::new());
    assert_ok!(harness.manager.register_handler("Hooks", hooks.clone()).await);
    assert_ok!(harness.manager.register_handler("Count", counting.clone()).await);

    assert_ok!(harness.manager.start().await);
    assert_eq!(harness.manager.lifecycle_status(), LifecycleStatus::Started);
    assert_eq!(hooks.events(), vec!["initialize", "start"]);
    assert_eq!(harness.manager.pool_stats().map(|s| s.completed_jobs), Some(0));

    let operation = harness.create("op-after-restart", "Count", &["d1", "d2"]).await;
    let progress = harness.wait_for_completion(operation.id).await;
    assert_eq!(progress.succeeded, 2);
    assert_eq!(counting.calls(), 2);
}

#[tokio::test]
async fn test_consumers_stop_with_the_manager() {
    let harness = TestHarness::started().await;
    harness.manager.register_handler("Count", Arc::new(CountingHandler::new())).await.unwrap();
    assert_ok!(harness.manager.stop().await);

    // A message published while stopped waits on the bus until restart
    let operation = harness
        .management
        .create_batch_operation(&BatchOperationCreateRequest::new("op-queued", "Count"))
        .await
        .unwrap();
    harness
        .channels()
        .publish_unprocessed_operation(&UnprocessedBatchOperation {
            batch_operation: operation.clone(),
            device_tokens: device_tokens(&["d1"]),
        })
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let stored = harness.operation(operation.id).await;
    assert_eq!(stored.processing_status, BatchOperationStatus::Created);

    assert_ok!(harness.manager.start().await);
    let progress = harness.wait_for_completion(operation.id).await;
    assert_eq!(progress.succeeded, 1);
}
