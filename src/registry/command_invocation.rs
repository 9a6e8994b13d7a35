//! # Batch Command Invocation
//!
//! Built-in handler that invokes one device command per element. Command
//! delivery belongs to a [`CommandInvoker`] collaborator; this handler only
//! builds the request and records the resulting invocation on the element.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::handler::BatchOperationHandler;
use crate::constants::{keys, operation_types};
use crate::error::{BatchError, BatchResult};
use crate::models::{
    BatchElement, BatchElementUpdateRequest, BatchOperation, ElementProcessingStatus,
};
use crate::orchestration::context::TaskContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandInitiator {
    BatchOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandTarget {
    Device,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommandInvocationRequest {
    pub command_token: String,
    pub initiator: CommandInitiator,
    /// Principal the batch pipeline acts as
    pub initiator_id: String,
    pub target: CommandTarget,
    pub target_id: String,
    pub device_id: Uuid,
    pub batch_operation_token: String,
    pub parameter_values: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInvocationReceipt {
    pub invocation_id: String,
}

/// Delivers a command invocation to a device
#[async_trait]
pub trait CommandInvoker: Send + Sync + 'static {
    async fn invoke_command(
        &self,
        ctx: &TaskContext,
        request: DeviceCommandInvocationRequest,
    ) -> BatchResult<CommandInvocationReceipt>;
}

/// Invoker that only logs; used by the bundled binary and local runs
#[derive(Debug, Default)]
pub struct LoggingCommandInvoker;

#[async_trait]
impl CommandInvoker for LoggingCommandInvoker {
    async fn invoke_command(
        &self,
        ctx: &TaskContext,
        request: DeviceCommandInvocationRequest,
    ) -> BatchResult<CommandInvocationReceipt> {
        let invocation_id = Uuid::new_v4().to_string();
        info!(
            tenant = %ctx.tenant_token(),
            command_token = %request.command_token,
            device_token = %request.target_id,
            invocation_id = %invocation_id,
            "Command invocation dispatched"
        );
        Ok(CommandInvocationReceipt { invocation_id })
    }
}

pub struct BatchCommandInvocationHandler {
    invoker: Arc<dyn CommandInvoker>,
}

impl std::fmt::Debug for BatchCommandInvocationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCommandInvocationHandler").finish()
    }
}

impl BatchCommandInvocationHandler {
    pub fn new(invoker: Arc<dyn CommandInvoker>) -> Self {
        Self { invoker }
    }

    fn build_request(
        ctx: &TaskContext,
        operation: &BatchOperation,
        element: &BatchElement,
    ) -> BatchResult<DeviceCommandInvocationRequest> {
        let command_token = operation
            .parameter(keys::COMMAND_TOKEN)
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                BatchError::handler(
                    operation_types::BATCH_COMMAND_INVOCATION,
                    format!("operation {} has no {} parameter", operation.token, keys::COMMAND_TOKEN),
                )
            })?;

        Ok(DeviceCommandInvocationRequest {
            command_token: command_token.to_string(),
            initiator: CommandInitiator::BatchOperation,
            initiator_id: ctx.principal.name.clone(),
            target: CommandTarget::Device,
            target_id: element.device_token.clone(),
            device_id: element.device_id,
            batch_operation_token: operation.token.clone(),
            parameter_values: operation.metadata.clone(),
        })
    }
}

#[async_trait]
impl BatchOperationHandler for BatchCommandInvocationHandler {
    fn name(&self) -> &str {
        "batch_command_invocation"
    }

    async fn process(
        &self,
        ctx: &TaskContext,
        operation: &BatchOperation,
        element: &BatchElement,
        update: &mut BatchElementUpdateRequest,
    ) -> BatchResult<ElementProcessingStatus> {
        let request = Self::build_request(ctx, operation, element)?;
        debug!(
            operation_token = %operation.token,
            device_token = %element.device_token,
            command_token = %request.command_token,
            "Invoking batch command"
        );

        let receipt = self.invoker.invoke_command(ctx, request).await?;
        update
            .metadata
            .insert(keys::INVOCATION_ID.to_string(), receipt.invocation_id);
        Ok(ElementProcessingStatus::Succeeded)
    }
}
