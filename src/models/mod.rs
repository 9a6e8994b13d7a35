//! # Data Model
//!
//! Batch operations, their per-device elements, the request types used to
//! create and update them, and a derived progress summary.

pub mod batch_element;
pub mod batch_operation;

pub use batch_element::{
    BatchElement, BatchElementCreateRequest, BatchElementSearchCriteria,
    BatchElementUpdateRequest, ElementProcessingStatus,
};
pub use batch_operation::{
    BatchCommandInvocationRequest, BatchOperation, BatchOperationCreateRequest,
    BatchOperationSearchCriteria, BatchOperationStatus, BatchOperationUpdateRequest,
};

use serde::{Deserialize, Serialize};

/// Element status counts for one operation. The operation status stops at
/// initialization, so callers use this to tell when processing has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOperationProgress {
    pub total: usize,
    pub unprocessed: usize,
    pub processing: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchOperationProgress {
    pub fn from_elements<'a>(elements: impl IntoIterator<Item = &'a BatchElement>) -> Self {
        elements
            .into_iter()
            .fold(Self::default(), |mut progress, element| {
                progress.total += 1;
                match element.processing_status {
                    ElementProcessingStatus::Unprocessed => progress.unprocessed += 1,
                    ElementProcessingStatus::Processing => progress.processing += 1,
                    ElementProcessingStatus::Succeeded => progress.succeeded += 1,
                    ElementProcessingStatus::Failed => progress.failed += 1,
                }
                progress
            })
    }

    /// Every element reached a terminal status
    pub fn is_complete(&self) -> bool {
        self.succeeded + self.failed == self.total
    }
}
