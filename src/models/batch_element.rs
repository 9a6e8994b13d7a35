use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Processing status of a single per-device unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementProcessingStatus {
    /// Created and queued, not yet claimed
    Unprocessed,
    /// Claimed by the element processing stage
    Processing,
    Succeeded,
    Failed,
}

impl ElementProcessingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Allowed moves: Unprocessed -> Processing -> Succeeded | Failed
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unprocessed, Self::Processing)
                | (Self::Processing, Self::Succeeded)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for ElementProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unprocessed => write!(f, "unprocessed"),
            Self::Processing => write!(f, "processing"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ElementProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unprocessed" => Ok(Self::Unprocessed),
            "processing" => Ok(Self::Processing),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid element processing status: {s}")),
        }
    }
}

/// Per-device unit of work derived from a batch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchElement {
    pub id: Uuid,
    pub batch_operation_id: Uuid,
    pub device_token: String,
    pub device_id: Uuid,
    pub processing_status: ElementProcessingStatus,
    pub processed_date: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
    pub created_date: DateTime<Utc>,
}

/// Request to create an element; also the dead-letter payload when creation
/// fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchElementCreateRequest {
    pub device_token: String,
    pub processing_status: ElementProcessingStatus,
    pub processed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl BatchElementCreateRequest {
    pub fn unprocessed(device_token: impl Into<String>) -> Self {
        Self {
            device_token: device_token.into(),
            processing_status: ElementProcessingStatus::Unprocessed,
            processed_date: None,
            metadata: HashMap::new(),
        }
    }
}

/// Partial update; handlers add entries to `metadata`, which are merged into
/// the stored element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchElementUpdateRequest {
    pub processing_status: Option<ElementProcessingStatus>,
    pub processed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl BatchElementUpdateRequest {
    pub fn status(status: ElementProcessingStatus) -> Self {
        Self {
            processing_status: Some(status),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchElementSearchCriteria {
    pub processing_status: Option<ElementProcessingStatus>,
    pub page: usize,
    /// Zero returns every matching element
    pub page_size: usize,
}

impl Default for BatchElementSearchCriteria {
    fn default() -> Self {
        Self {
            processing_status: None,
            page: 1,
            page_size: 0,
        }
    }
}

impl BatchElementSearchCriteria {
    pub fn with_status(status: ElementProcessingStatus) -> Self {
        Self {
            processing_status: Some(status),
            ..Default::default()
        }
    }
}
