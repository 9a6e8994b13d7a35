//! # Orchestration
//!
//! The batch pipeline: a manager owning one worker pool that runs three kinds
//! of job.
//!
//! - **Submission** ([`OperationCreator`]): publishes a persisted operation and
//!   its device list, keyed by operation token.
//! - **Initialization** ([`OperationInitializer`]): creates one element per
//!   device, queues each keyed by device id and dead-letters the rest.
//! - **Processing** ([`ElementProcessor`]): claims an element, runs its handler
//!   and stores the terminal status.
//!
//! Two [`BatchConsumer`] loops feed the initialization and processing jobs
//! from the bus. [`ProcessingControl`] carries the pause flag and throttle
//! delay every job checks between units of work.

pub mod consumers;
pub mod context;
pub mod control;
pub mod element_processor;
pub mod lifecycle;
pub mod manager;
pub mod operation_creator;
pub mod operation_initializer;
pub mod worker_pool;

pub use consumers::{BatchConsumer, ConsumerKind};
pub use context::{BatchContext, SystemPrincipal, TaskContext};
pub use control::ProcessingControl;
pub use element_processor::{ElementProcessor, ProcessingOutcome};
pub use lifecycle::LifecycleStatus;
pub use manager::BatchOperationManager;
pub use operation_creator::OperationCreator;
pub use operation_initializer::{InitializationOutcome, OperationInitializer};
pub use worker_pool::{JobKind, WorkerPool, WorkerPoolStats};
