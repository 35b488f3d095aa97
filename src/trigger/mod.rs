//! Triggers decide when a StreamSheet may process.
//!
//! One closed set of variants ([`TriggerKind`]) shares a single state
//! machine:
//!
//! ```text
//! IDLE -> PROCESSING -> (RETURNED | SUSPENDED) -> IDLE
//! ```
//!
//! - `IDLE`/`RETURNED`: waiting for the variant's admission event
//! - `PROCESSING`: a step ran and an endless repeat, a loop turn or a
//!   chained execute is still outstanding
//! - `SUSPENDED`: the sheet halted itself with `pause()`/`sleep()`/`await()`

mod config;
mod timer;

pub use config::{IntervalUnit, RepeatMode, TriggerConfig, TriggerKind};
pub use timer::TimerSchedule;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// State of a trigger instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerState {
    Idle,
    Processing,
    Returned,
    Suspended,
}

/// External events a trigger may admit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionEvent {
    /// Machine cycle tick while running
    Tick,
    /// Manual `step()` on the machine
    ManualStep,
    MachineStart,
    MachineStop,
    /// A message was put into the sheet's inbox
    MessageArrived,
    /// The trigger's own timer fired
    TimerDue,
}

/// Admission and repeat policy bound to one StreamSheet
#[derive(Debug, Clone)]
pub struct Trigger {
    config: TriggerConfig,
    state: TriggerState,
    bound_to: Option<String>,
    timer: Option<TimerSchedule>,
}

impl Trigger {
    /// Restore a trigger from its persisted configuration
    pub fn from_config(config: TriggerConfig) -> Result<Self> {
        config.validate()?;
        let timer = Self::schedule_for(&config);
        Ok(Self {
            config,
            state: TriggerState::Idle,
            bound_to: None,
            timer,
        })
    }

    /// Shorthand for `from_config` with no timer settings
    pub fn new(kind: TriggerKind, repeat: RepeatMode) -> Result<Self> {
        let mut config = TriggerConfig::new(kind);
        config.repeat = repeat;
        Self::from_config(config)
    }

    fn schedule_for(config: &TriggerConfig) -> Option<TimerSchedule> {
        match (config.kind, config.interval_ms()) {
            (TriggerKind::Timer, Some(ms)) => Some(TimerSchedule::new(ms, config.start_ms())),
            _ => None,
        }
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Persisted form of this trigger
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.config)?)
    }

    pub fn kind(&self) -> TriggerKind {
        self.config.kind
    }

    pub fn repeat(&self) -> RepeatMode {
        self.config.repeat
    }

    pub fn is_endless(&self) -> bool {
        self.config.repeat == RepeatMode::Endless
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn bound_to(&self) -> Option<&str> {
        self.bound_to.as_deref()
    }

    /// Bind to a StreamSheet. A trigger serves exactly one sheet.
    pub fn bind(&mut self, sheet: &str) -> Result<()> {
        match &self.bound_to {
            Some(owner) if owner != sheet => Err(EngineError::TriggerAlreadyBound(owner.clone())),
            _ => {
                self.bound_to = Some(sheet.to_string());
                Ok(())
            }
        }
    }

    /// Same type and repeat mode
    pub fn is_equivalent(&self, config: &TriggerConfig) -> bool {
        self.config.kind == config.kind && self.config.repeat == config.repeat
    }

    /// Apply an equivalent configuration without touching the state
    pub(crate) fn reconfigure(&mut self, config: TriggerConfig) -> Result<()> {
        config.validate()?;
        let armed = self.timer.as_ref().is_some_and(|t| t.is_armed());
        let schedule_changed = config.interval_ms() != self.config.interval_ms()
            || config.start != self.config.start;
        self.config = config;
        if schedule_changed {
            self.timer = Self::schedule_for(&self.config);
            if !armed {
                self.disarm();
            }
        }
        Ok(())
    }

    /// Waiting for an external admission
    pub fn is_idle(&self) -> bool {
        matches!(self.state, TriggerState::Idle | TriggerState::Returned)
    }

    /// Whether `event` starts a new step. `inbox_ready` reports an
    /// unprocessed message in the bound sheet's inbox.
    pub fn admits(&self, event: AdmissionEvent, inbox_ready: bool) -> bool {
        if !self.is_idle() {
            return false;
        }
        match (self.config.kind, event) {
            (TriggerKind::Continuously, AdmissionEvent::Tick | AdmissionEvent::ManualStep) => true,
            (
                TriggerKind::Arrival,
                AdmissionEvent::Tick | AdmissionEvent::ManualStep | AdmissionEvent::MessageArrived,
            ) => inbox_ready,
            (TriggerKind::Timer, AdmissionEvent::TimerDue | AdmissionEvent::ManualStep) => true,
            (TriggerKind::MachineStart, AdmissionEvent::MachineStart) => true,
            (TriggerKind::MachineStop, AdmissionEvent::MachineStop) => true,
            _ => false,
        }
    }

    pub(crate) fn set_state(&mut self, state: TriggerState) {
        self.state = state;
    }

    /// Start the timer if this is a timer trigger and it is not running
    pub(crate) fn arm(&mut self, now: u64) {
        if let Some(timer) = self.timer.as_mut() {
            if !timer.is_armed() {
                timer.arm(now);
            }
        }
    }

    pub(crate) fn disarm(&mut self) {
        if let Some(timer) = self.timer.as_mut() {
            timer.disarm();
        }
    }

    pub(crate) fn fire_if_due(&mut self, now: u64) -> bool {
        self.timer.as_mut().is_some_and(|t| t.fire_if_due(now))
    }

    /// Next timer fire, if armed
    pub fn next_due(&self) -> Option<u64> {
        self.timer.as_ref().and_then(|t| t.next_due())
    }
}
