//! # Batch Context
//!
//! Tenant-scoped dependency container and the identity carried by every
//! pipeline task.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::BatchOperationsConfig;
use crate::constants::defaults;
use crate::messaging::{BatchChannels, MessagingService, TopicNaming};
use crate::persistence::BatchManagement;

/// Identity the pipeline acts as when it touches tenant data
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SystemPrincipal {
    pub name: String,
    pub tenant_token: String,
}

impl SystemPrincipal {
    pub fn system(tenant_token: impl Into<String>) -> Self {
        Self {
            name: defaults::SYSTEM_PRINCIPAL.to_string(),
            tenant_token: tenant_token.into(),
        }
    }
}

/// Passed explicitly to every submission, initialization and processing task
/// and to handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub principal: SystemPrincipal,
}

impl TaskContext {
    pub fn new(principal: SystemPrincipal) -> Self {
        Self { principal }
    }

    pub fn tenant_token(&self) -> &str {
        &self.principal.tenant_token
    }
}

/// Shared dependencies of one tenant's batch operations engine
pub struct BatchContext {
    pub config: BatchOperationsConfig,
    pub management: Arc<dyn BatchManagement>,
    pub channels: BatchChannels,
    pub principal: SystemPrincipal,
}

impl std::fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchContext")
            .field("config", &self.config)
            .field("management", &"Arc<dyn BatchManagement>")
            .field("channels", &self.channels)
            .field("principal", &self.principal)
            .finish()
    }
}

impl BatchContext {
    pub fn new(
        config: BatchOperationsConfig,
        management: Arc<dyn BatchManagement>,
        messaging: Arc<dyn MessagingService>,
    ) -> Self {
        let channels = BatchChannels::new(messaging, TopicNaming::from_config(&config.topics));
        let principal = SystemPrincipal::system(config.topics.tenant_token.clone());
        Self {
            config,
            management,
            channels,
            principal,
        }
    }

    pub fn task_context(&self) -> TaskContext {
        TaskContext::new(self.principal.clone())
    }
}
