#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Batch Operations Core
//!
//! Batch operation pipeline for a multi-tenant device platform: one request
//! applies an action (typically a device command) to many devices.
//!
//! ## Overview
//!
//! An operation is persisted, published to the bus, expanded into one element
//! per device and each element is executed by the handler registered for the
//! operation type. Work crosses three tenant-scoped topics:
//!
//! - `unprocessed-batch-operations`, keyed by operation token
//! - `unprocessed-batch-elements`, keyed by device id
//! - `failed-batch-elements`, keyed by device token
//!
//! ## Module Organization
//!
//! - [`config`] - Typed configuration loaded from defaults, TOML and environment
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup and domain log helpers
//! - [`messaging`] - Bus abstraction, in-memory provider and pipeline topics
//! - [`models`] - Operations, elements and their requests
//! - [`orchestration`] - Manager, worker pool and the three pipeline stages
//! - [`persistence`] - `BatchManagement` store contract and in-memory store
//! - [`registry`] - Per-operation-type handlers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batch_ops_core::config::ConfigLoader;
//! use batch_ops_core::messaging::InMemoryMessagingService;
//! use batch_ops_core::orchestration::BatchOperationManager;
//! use batch_ops_core::persistence::InMemoryBatchManagement;
//! use batch_ops_core::registry::{HandlerDependencies, LoggingCommandInvoker};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::from_env().load()?;
//! let deps = HandlerDependencies::default()
//!     .with_command_invoker(Arc::new(LoggingCommandInvoker));
//! let manager = Arc::new(BatchOperationManager::from_config(
//!     config,
//!     Arc::new(InMemoryBatchManagement::new()),
//!     Arc::new(InMemoryMessagingService::new()),
//!     &deps,
//! )?);
//! manager.initialize().await?;
//! manager.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod registry;

pub use config::BatchOperationsConfig;
pub use error::{BatchError, BatchResult};
pub use messaging::{InMemoryMessagingService, MessagingError, MessagingService};
pub use models::{
    BatchElement, BatchOperation, BatchOperationProgress, BatchOperationStatus,
    ElementProcessingStatus,
};
pub use orchestration::{BatchContext, BatchOperationManager, LifecycleStatus, TaskContext};
pub use persistence::{BatchManagement, InMemoryBatchManagement};
pub use registry::{BatchOperationHandler, HandlerRegistry};
