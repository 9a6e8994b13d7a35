//! Proptest strategies for batch model types

use batch_ops_core::models::{BatchOperationStatus, ElementProcessingStatus};
use proptest::prelude::*;

pub fn element_status_strategy() -> impl Strategy<Value = ElementProcessingStatus> {
    prop_oneof![
        Just(ElementProcessingStatus::Unprocessed),
        Just(ElementProcessingStatus::Processing),
        Just(ElementProcessingStatus::Succeeded),
        Just(ElementProcessingStatus::Failed),
    ]
}

pub fn operation_status_strategy() -> impl Strategy<Value = BatchOperationStatus> {
    prop_oneof![
        Just(BatchOperationStatus::Created),
        Just(BatchOperationStatus::Initializing),
        Just(BatchOperationStatus::InitializedSuccessfully),
        Just(BatchOperationStatus::InitializedWithErrors),
    ]
}

/// Arbitrary sequences of attempted element status updates
pub fn element_update_sequence_strategy() -> impl Strategy<Value = Vec<ElementProcessingStatus>> {
    prop::collection::vec(element_status_strategy(), 0..12)
}

/// Device token lists that may repeat tokens
pub fn device_tokens_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("d[0-9]{1,2}", 0..20)
}
