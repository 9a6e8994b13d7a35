//! # Handler Factory
//!
//! Builds handlers from the configured registration table.
//!
//! ```rust
//! use batch_ops_core::config::BatchOperationsConfig;
//! use batch_ops_core::registry::{
//!     HandlerDependencies, HandlerFactory, HandlerRegistry, LoggingCommandInvoker,
//! };
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = HandlerFactory::with_builtins();
//! let registry = HandlerRegistry::new();
//! let deps = HandlerDependencies::default()
//!     .with_command_invoker(Arc::new(LoggingCommandInvoker));
//!
//! factory.populate(&registry, &BatchOperationsConfig::default().handlers, &deps)?;
//! assert!(registry.contains("BatchCommandInvocation"));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use super::command_invocation::{BatchCommandInvocationHandler, CommandInvoker};
use super::handler::BatchOperationHandler;
use super::handler_registry::HandlerRegistry;
use crate::config::HandlerRegistrationConfig;
use crate::constants::handler_kinds;
use crate::error::{BatchError, BatchResult};

/// Collaborators handlers may need at construction time
#[derive(Clone, Default)]
pub struct HandlerDependencies {
    pub command_invoker: Option<Arc<dyn CommandInvoker>>,
}

impl HandlerDependencies {
    pub fn with_command_invoker(mut self, invoker: Arc<dyn CommandInvoker>) -> Self {
        self.command_invoker = Some(invoker);
        self
    }
}

pub type HandlerConstructor = Arc<
    dyn Fn(&HandlerDependencies) -> BatchResult<Arc<dyn BatchOperationHandler>> + Send + Sync,
>;

/// Handler kind name to constructor
#[derive(Default)]
pub struct HandlerFactory {
    constructors: DashMap<String, HandlerConstructor>,
}

impl std::fmt::Debug for HandlerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<String> = self.constructors.iter().map(|e| e.key().clone()).collect();
        kinds.sort();
        f.debug_struct("HandlerFactory").field("kinds", &kinds).finish()
    }
}

impl HandlerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory knowing the built-in handler kinds
    pub fn with_builtins() -> Self {
        let factory = Self::new();
        factory.register_kind(
            handler_kinds::BATCH_COMMAND_INVOCATION,
            Arc::new(
                |deps: &HandlerDependencies| -> BatchResult<Arc<dyn BatchOperationHandler>> {
                    let invoker = deps.command_invoker.clone().ok_or_else(|| {
                        BatchError::Configuration(format!(
                            "handler kind '{}' requires a command invoker",
                            handler_kinds::BATCH_COMMAND_INVOCATION
                        ))
                    })?;
                    Ok(Arc::new(BatchCommandInvocationHandler::new(invoker)))
                },
            ),
        );
        factory
    }

    pub fn register_kind(&self, kind: impl Into<String>, constructor: HandlerConstructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    pub fn knows(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn create(
        &self,
        kind: &str,
        deps: &HandlerDependencies,
    ) -> BatchResult<Arc<dyn BatchOperationHandler>> {
        let constructor = self
            .constructors
            .get(kind)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BatchError::Configuration(format!("unknown handler kind: {kind}")))?;
        constructor(deps)
    }

    /// Registers one handler per table entry; returns how many were registered
    pub fn populate(
        &self,
        registry: &HandlerRegistry,
        registrations: &[HandlerRegistrationConfig],
        deps: &HandlerDependencies,
    ) -> BatchResult<usize> {
        for registration in registrations {
            let handler = self.create(&registration.kind, deps)?;
            registry.register(registration.operation_type.clone(), handler);
        }
        info!(count = registrations.len(), "Registered configured batch operation handlers");
        Ok(registrations.len())
    }
}
