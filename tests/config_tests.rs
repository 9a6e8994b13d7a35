//! Configuration layering: defaults, TOML file and environment overrides

use std::io::Write;
use std::sync::Arc;

use batch_ops_core::config::{BatchOperationsConfig, ConfigLoader, ConfigurationError};
use batch_ops_core::messaging::InMemoryMessagingService;
use batch_ops_core::orchestration::BatchOperationManager;
use batch_ops_core::persistence::InMemoryBatchManagement;
use batch_ops_core::registry::{HandlerDependencies, LoggingCommandInvoker};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_full_file_round_trips_into_manager() {
    let file = write_config(
        r#"
[worker_pool]
size = 3
queue_capacity = 50

[throttle]
delay_ms = 15

[processing]
handler_timeout_ms = 2500

[consumers]
batch_size = 5
poll_interval_ms = 20
consumer_group = "batch-ops-test"

[topics]
product_id = "platform"
instance_id = "staging"
tenant_token = "acme"

[[handlers]]
operation_type = "BatchCommandInvocation"
kind = "batch_command_invocation"

[[handlers]]
operation_type = "FirmwareReboot"
kind = "batch_command_invocation"
"#,
    );

    let config = ConfigLoader::from_file(file.path()).load().unwrap();
    assert_eq!(config.worker_pool.size, 3);
    assert_eq!(config.worker_pool.queue_capacity, 50);
    assert_eq!(config.processing.handler_timeout_ms, 2500);
    assert_eq!(config.consumers.batch_size, 5);
    assert_eq!(config.consumers.consumer_group, "batch-ops-test");
    assert_eq!(config.consumers.visibility_timeout_ms, 30_000);

    let deps = HandlerDependencies::default().with_command_invoker(Arc::new(LoggingCommandInvoker));
    let manager = BatchOperationManager::from_config(
        config,
        Arc::new(InMemoryBatchManagement::new()),
        Arc::new(InMemoryMessagingService::new()),
        &deps,
    )
    .unwrap();

    assert_eq!(
        manager.registry().registered_types(),
        vec!["BatchCommandInvocation", "FirmwareReboot"]
    );
    assert_eq!(manager.throttle_delay().as_millis(), 15);
    assert_eq!(
        manager.context().channels.topics().failed_batch_elements(),
        "platform.staging.tenant.acme.failed-batch-elements"
    );
    assert_eq!(manager.context().task_context().tenant_token(), "acme");
}

#[test]
fn test_unknown_handler_kind_is_rejected_at_registration() {
    let file = write_config(
        r#"
[[handlers]]
operation_type = "Mystery"
kind = "does_not_exist"
"#,
    );
    let config = ConfigLoader::from_file(file.path()).load().unwrap();

    let err = BatchOperationManager::from_config(
        config,
        Arc::new(InMemoryBatchManagement::new()),
        Arc::new(InMemoryMessagingService::new()),
        &HandlerDependencies::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("does_not_exist"));
}

#[test]
fn test_topic_segments_may_not_contain_separators() {
    let file = write_config("[topics]\ntenant_token = \"acme.eu\"\n");
    let err = ConfigLoader::from_file(file.path()).load().unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
}

#[test]
fn test_malformed_file_is_a_load_error() {
    let file = write_config("[worker_pool\nsize = ");
    assert!(ConfigLoader::from_file(file.path()).load().is_err());
}

/// The only test in this binary that touches process environment
#[test]
fn test_environment_overrides_file_values() {
    let file = write_config("[worker_pool]\nsize = 4\n\n[throttle]\ndelay_ms = 10\n");

    std::env::set_var("BATCH_OPS_CONFIG_PATH", file.path());
    std::env::set_var("BATCH_OPS_WORKER_POOL__SIZE", "7");
    std::env::set_var("BATCH_OPS_TOPICS__TENANT_TOKEN", "from-env");

    let loaded = ConfigLoader::from_env().load();

    std::env::remove_var("BATCH_OPS_CONFIG_PATH");
    std::env::remove_var("BATCH_OPS_WORKER_POOL__SIZE");
    std::env::remove_var("BATCH_OPS_TOPICS__TENANT_TOKEN");

    let config = loaded.unwrap();
    assert_eq!(config.worker_pool.size, 7);
    assert_eq!(config.throttle.delay_ms, 10);
    assert_eq!(config.topics.tenant_token, "from-env");
    assert_ne!(config, BatchOperationsConfig::default());
}
