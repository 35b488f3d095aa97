//! Machine run state and settings

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Stopped,
    Running,
    Paused,
}

/// Scheduling parameters of a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    /// Milliseconds between cycle ticks while running
    pub cycletime_ms: u64,
    /// Max execute turns run back to back before yielding to the next cycle
    pub turn_budget: usize,
    /// Max nesting of `execute()` calls
    pub max_chain_depth: usize,
    /// Capacity of each StreamSheet inbox built from config; `None` = unbounded
    pub inbox_max_size: Option<usize>,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            cycletime_ms: 50,
            turn_budget: 10_000,
            max_chain_depth: 16,
            inbox_max_size: Some(100),
        }
    }
}

impl MachineSettings {
    pub fn with_cycletime(mut self, ms: u64) -> Self {
        self.cycletime_ms = ms;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cycletime_ms == 0 {
            return Err(EngineError::Config("cycletime_ms must be positive".to_string()));
        }
        if self.turn_budget == 0 {
            return Err(EngineError::Config("turn_budget must be positive".to_string()));
        }
        if self.max_chain_depth == 0 {
            return Err(EngineError::Config("max_chain_depth must be positive".to_string()));
        }
        if self.inbox_max_size == Some(0) {
            return Err(EngineError::Config("inbox_max_size must be positive".to_string()));
        }
        Ok(())
    }
}
