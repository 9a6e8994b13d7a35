//! # Handler Registry
//!
//! Operation type to handler map, read on every element and written only
//! during setup or on explicit dynamic registration.
//!
//! ```rust
//! use batch_ops_core::registry::HandlerRegistry;
//!
//! let registry = HandlerRegistry::new();
//! assert!(registry.get("BatchCommandInvocation").is_none());
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::handler::BatchOperationHandler;
use crate::error::BatchResult;
use crate::logging::log_registry_operation;
use crate::orchestration::context::TaskContext;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn BatchOperationHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("operation_types", &self.registered_types())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing and returning any previous one
    pub fn register(
        &self,
        operation_type: impl Into<String>,
        handler: Arc<dyn BatchOperationHandler>,
    ) -> Option<Arc<dyn BatchOperationHandler>> {
        let operation_type = operation_type.into();
        let handler_name = handler.name().to_string();
        let previous = self.handlers.insert(operation_type.clone(), handler);

        log_registry_operation(
            "register",
            Some(&operation_type),
            Some(&handler_name),
            if previous.is_some() { "replaced" } else { "registered" },
            None,
        );
        previous
    }

    pub fn unregister(&self, operation_type: &str) -> Option<Arc<dyn BatchOperationHandler>> {
        let removed = self.handlers.remove(operation_type).map(|(_, handler)| handler);
        if removed.is_some() {
            log_registry_operation("unregister", Some(operation_type), None, "removed", None);
        }
        removed
    }

    pub fn get(&self, operation_type: &str) -> Option<Arc<dyn BatchOperationHandler>> {
        self.handlers
            .get(operation_type)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, operation_type: &str) -> bool {
        self.handlers.contains_key(operation_type)
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Snapshot so lifecycle hooks run without holding map shards across awaits
    fn snapshot(&self) -> Vec<(String, Arc<dyn BatchOperationHandler>)> {
        self.handlers
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub async fn initialize_all(&self, ctx: &TaskContext) -> BatchResult<()> {
        for (operation_type, handler) in self.snapshot() {
            debug!(operation_type = %operation_type, handler = handler.name(), "Initializing handler");
            handler.initialize(ctx).await?;
        }
        Ok(())
    }

    pub async fn start_all(&self, ctx: &TaskContext) -> BatchResult<()> {
        for (operation_type, handler) in self.snapshot() {
            debug!(operation_type = %operation_type, handler = handler.name(), "Starting handler");
            handler.start(ctx).await?;
        }
        Ok(())
    }

    /// Stops every handler; failures are logged and do not stop the rest
    pub async fn stop_all(&self, ctx: &TaskContext) {
        for (operation_type, handler) in self.snapshot() {
            if let Err(e) = handler.stop(ctx).await {
                warn!(
                    operation_type = %operation_type,
                    handler = handler.name(),
                    error = %e,
                    "Handler failed to stop cleanly"
                );
            }
        }
    }
}
