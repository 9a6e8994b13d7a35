//! # Handler Registry
//!
//! Pluggable per-operation-type handlers, their registry and the factory that
//! builds them from configuration.

pub mod command_invocation;
pub mod handler;
pub mod handler_factory;
pub mod handler_registry;

pub use command_invocation::{
    BatchCommandInvocationHandler, CommandInitiator, CommandInvocationReceipt, CommandInvoker,
    CommandTarget, DeviceCommandInvocationRequest, LoggingCommandInvoker,
};
pub use handler::BatchOperationHandler;
pub use handler_factory::{HandlerConstructor, HandlerDependencies, HandlerFactory};
pub use handler_registry::HandlerRegistry;
