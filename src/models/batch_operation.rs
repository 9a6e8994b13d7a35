use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::constants::{keys, operation_types};

/// Aggregate status of a batch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperationStatus {
    /// Recorded but not yet picked up by the initialization stage
    Created,
    /// Elements are being created and queued
    Initializing,
    /// Every element was created and queued
    InitializedSuccessfully,
    /// At least one element could not be created and was dead-lettered
    InitializedWithErrors,
}

impl BatchOperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InitializedSuccessfully | Self::InitializedWithErrors
        )
    }

    /// Allowed moves: Created -> Initializing -> InitializedSuccessfully |
    /// InitializedWithErrors. Re-entering the current status is refused so a
    /// redelivered operation cannot be initialized twice.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Initializing)
                | (Self::Initializing, Self::InitializedSuccessfully)
                | (Self::Initializing, Self::InitializedWithErrors)
        )
    }
}

impl fmt::Display for BatchOperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Initializing => write!(f, "initializing"),
            Self::InitializedSuccessfully => write!(f, "initialized_successfully"),
            Self::InitializedWithErrors => write!(f, "initialized_with_errors"),
        }
    }
}

impl std::str::FromStr for BatchOperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "initializing" => Ok(Self::Initializing),
            "initialized_successfully" => Ok(Self::InitializedSuccessfully),
            "initialized_with_errors" => Ok(Self::InitializedWithErrors),
            _ => Err(format!("Invalid batch operation status: {s}")),
        }
    }
}

/// Persisted record of a request to apply one action to many devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperation {
    pub id: Uuid,
    pub token: String,
    pub operation_type: String,
    pub parameters: HashMap<String, String>,
    pub metadata: HashMap<String, String>,
    pub processing_status: BatchOperationStatus,
    pub processing_started_date: Option<DateTime<Utc>>,
    pub processing_ended_date: Option<DateTime<Utc>>,
    pub created_date: DateTime<Utc>,
}

impl BatchOperation {
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOperationCreateRequest {
    /// Generated when absent
    pub token: Option<String>,
    pub operation_type: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl BatchOperationCreateRequest {
    pub fn new(token: impl Into<String>, operation_type: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            operation_type: operation_type.into(),
            ..Default::default()
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOperationUpdateRequest {
    pub processing_status: Option<BatchOperationStatus>,
    pub processing_started_date: Option<DateTime<Utc>>,
    pub processing_ended_date: Option<DateTime<Utc>>,
    pub metadata: Option<HashMap<String, String>>,
}

impl BatchOperationUpdateRequest {
    pub fn status(status: BatchOperationStatus) -> Self {
        Self {
            processing_status: Some(status),
            ..Default::default()
        }
    }
}

/// Convenience request for the built-in command invocation operation type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchCommandInvocationRequest {
    pub token: Option<String>,
    pub command_token: String,
    #[serde(default)]
    pub parameter_values: HashMap<String, String>,
    pub device_tokens: Vec<String>,
}

impl BatchCommandInvocationRequest {
    pub fn to_operation_request(&self, token: String) -> BatchOperationCreateRequest {
        BatchOperationCreateRequest {
            token: Some(token),
            operation_type: operation_types::BATCH_COMMAND_INVOCATION.to_string(),
            parameters: HashMap::from([(
                keys::COMMAND_TOKEN.to_string(),
                self.command_token.clone(),
            )]),
            metadata: self.parameter_values.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOperationSearchCriteria {
    pub page: usize,
    pub page_size: usize,
}

impl Default for BatchOperationSearchCriteria {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 100,
        }
    }
}
