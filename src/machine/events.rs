//! Events published by a machine to its subscribers

use serde::Serialize;

/// Lifecycle and progress notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MachineEvent {
    Started,
    Paused,
    Stopped,
    /// A cycle finished; `steps` counts cycles since the last start from stopped
    StepPassed { steps: u64 },
}
