//! Persisted trigger configuration
//!
//! Serialized form: `{ type, repeat: "once"|"endless", interval?, intervalUnit?, start? }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Trigger variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Never processes
    None,
    /// Once when the machine starts
    #[serde(rename = "start")]
    MachineStart,
    /// Once when the machine stops
    #[serde(rename = "stop")]
    MachineStop,
    /// Every machine tick
    Continuously,
    /// When an unprocessed message is in the inbox
    Arrival,
    /// On a fixed interval
    Timer,
    /// Only through `execute()` from another sheet
    Execute,
}

/// Repeat behaviour after an admitted step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// One step per admission
    #[default]
    Once,
    /// Repeat until `return()`
    Endless,
}

/// Unit of a timer interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    #[default]
    Ms,
    S,
    M,
    H,
    D,
}

impl IntervalUnit {
    /// Convert `amount` of this unit to milliseconds
    pub fn to_ms(&self, amount: u64) -> u64 {
        let factor = match self {
            IntervalUnit::Ms => 1,
            IntervalUnit::S => 1_000,
            IntervalUnit::M => 60_000,
            IntervalUnit::H => 3_600_000,
            IntervalUnit::D => 86_400_000,
        };
        amount.saturating_mul(factor)
    }
}

/// Serializable trigger configuration, restorable through
/// [`crate::trigger::Trigger::from_config`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    #[serde(default)]
    pub repeat: RepeatMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_unit: Option<IntervalUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self::new(TriggerKind::Continuously)
    }
}

impl TriggerConfig {
    pub fn new(kind: TriggerKind) -> Self {
        Self {
            kind,
            repeat: RepeatMode::Once,
            interval: None,
            interval_unit: None,
            start: None,
        }
    }

    /// Switch to repeat-until-return
    pub fn endless(mut self) -> Self {
        self.repeat = RepeatMode::Endless;
        self
    }

    pub fn with_interval(mut self, interval: u64, unit: IntervalUnit) -> Self {
        self.interval = Some(interval);
        self.interval_unit = Some(unit);
        self
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Interval in milliseconds, if configured
    pub fn interval_ms(&self) -> Option<u64> {
        self.interval
            .map(|n| self.interval_unit.unwrap_or_default().to_ms(n))
    }

    /// Absolute start time in Unix ms
    pub fn start_ms(&self) -> Option<u64> {
        self.start.map(|s| s.timestamp_millis().max(0) as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.kind == TriggerKind::Timer {
            match self.interval_ms() {
                Some(ms) if ms > 0 => {}
                _ => {
                    return Err(EngineError::InvalidTrigger(
                        "timer trigger requires an interval > 0".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}
