//! Bus payloads exchanged between pipeline stages

use serde::{Deserialize, Serialize};

use crate::models::{BatchElement, BatchOperation};

/// Published by the submission stage, keyed by operation token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnprocessedBatchOperation {
    pub batch_operation: BatchOperation,
    pub device_tokens: Vec<String>,
}

/// Published by the initialization stage, keyed by device id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnprocessedBatchElement {
    pub batch_element: BatchElement,
}
