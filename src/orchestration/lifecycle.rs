use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a [`BatchOperationManager`](super::manager::BatchOperationManager)
///
/// `Stopped -> Initializing -> Initialized -> Starting -> Started <-> Paused
/// -> Stopping -> Stopped`, with `Error` after a failed lifecycle step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Stopped,
    Initializing,
    Initialized,
    Starting,
    Started,
    Paused,
    Stopping,
    Error,
}

impl LifecycleStatus {
    /// Worker pool and consumers are up
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Started | Self::Paused)
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}
