//! StreamSheet: one sheet, its inbox, and the trigger that drives it.
//!
//! A step selects the current message, positions the loop cursor and
//! recalculates the sheet. The recalculation may finish, return, or halt on
//! a suspension point or an `execute()` call. Scheduling (when a step runs
//! and what happens after it) is the machine's job; a StreamSheet only knows
//! how to run one step and how to continue a halted one.

mod loop_cursor;
mod stats;
mod suspension;

pub use loop_cursor::{LoopCursor, LoopSettings};
pub use stats::StreamSheetStats;
pub use suspension::Suspension;

use std::collections::HashMap;
use std::fmt;

use crate::error::{EngineError, Result};
use crate::execute::ExecuteCall;
use crate::id::generate_sheet_id;
use crate::message::{Inbox, Message};
use crate::requests::RequestRegistry;
use crate::sheet::{Halt, Sheet, SheetEntry, StepContext, StepEffects, Value};
use crate::trigger::{Trigger, TriggerConfig, TriggerState};

/// Callback run once when a StreamSheet is removed from its machine
pub type DisposeListener = Box<dyn FnOnce(&str) + Send>;

/// How a step was started; decides which counters move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// Admitted by the trigger
    Admitted,
    /// Endless repeat without new admission
    Repeat,
    /// Continue a halted recalculation
    Resume,
    /// First step of an `execute()` repetition
    ExecuteRepetition,
    /// Further step inside one `execute()` repetition
    ExecuteSubStep,
}

/// Why a step stopped before its last cell
#[derive(Debug, Clone, PartialEq)]
pub enum HaltReason {
    /// `pause()`, `sleep()` or `await()`; see [`StreamSheet::suspension`]
    Suspended,
    /// `execute()` at `cell` is waiting for its callee
    Execute { cell: usize, call: ExecuteCall },
}

/// Result of [`StreamSheet::process_step`]
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Nothing ran: suspended, or nothing to resume
    Skipped,
    Halted(HaltReason),
    Completed {
        /// The message (or its last loop element) is done
        finished: bool,
        /// `return()` ran
        returned: bool,
        /// Value given to `return()`
        value: Option<Value>,
    },
}

/// Machine-owned inputs to one step
pub struct StepEnv<'a> {
    pub now: u64,
    pub directory: &'a [SheetEntry],
    pub requests: &'a mut RequestRegistry,
}

pub struct StreamSheet {
    id: String,
    name: String,
    sheet: Box<dyn Sheet>,
    inbox: Inbox,
    trigger: Trigger,
    loop_settings: LoopSettings,
    cursor: LoopCursor,
    stats: StreamSheetStats,
    suspension: Suspension,
    resume_at: Option<usize>,
    current: Option<Message>,
    explicit_message: Option<Message>,
    execute_results: HashMap<usize, Value>,
    dispose_listeners: Vec<DisposeListener>,
    in_step: bool,
}

impl fmt::Debug for StreamSheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSheet")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .field("inbox", &self.inbox.size())
            .field("stats", &self.stats)
            .field("suspension", &self.suspension)
            .field("resume_at", &self.resume_at)
            .finish()
    }
}

impl StreamSheet {
    /// Create a StreamSheet and bind `trigger` to it
    pub fn new(name: &str, sheet: impl Sheet + 'static, mut trigger: Trigger) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(EngineError::Config("streamsheet name must not be empty".to_string()));
        }
        trigger.bind(name)?;
        Ok(Self {
            id: generate_sheet_id(),
            name: name.to_string(),
            sheet: Box::new(sheet),
            inbox: Inbox::new(),
            trigger,
            loop_settings: LoopSettings::default(),
            cursor: LoopCursor::default(),
            stats: StreamSheetStats::default(),
            suspension: Suspension::None,
            resume_at: None,
            current: None,
            explicit_message: None,
            execute_results: HashMap::new(),
            dispose_listeners: Vec::new(),
            in_step: false,
        })
    }

    pub fn with_loop(mut self, settings: LoopSettings) -> Self {
        self.loop_settings = settings;
        self
    }

    pub fn with_inbox_max_size(mut self, max_size: Option<usize>) -> Self {
        self.inbox = Inbox::with_max_size(max_size);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sheet(&self) -> &dyn Sheet {
        self.sheet.as_ref()
    }

    pub fn sheet_mut(&mut self) -> &mut dyn Sheet {
        self.sheet.as_mut()
    }

    /// Shorthand for `sheet().value_at(cell)`
    pub fn value_at(&self, cell: &str) -> Option<Value> {
        self.sheet.value_at(cell)
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub fn inbox_mut(&mut self) -> &mut Inbox {
        &mut self.inbox
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub(crate) fn trigger_mut(&mut self) -> &mut Trigger {
        &mut self.trigger
    }

    pub fn loop_settings(&self) -> &LoopSettings {
        &self.loop_settings
    }

    pub fn set_loop(&mut self, settings: LoopSettings) {
        self.loop_settings = settings;
        self.cursor.reset();
    }

    pub fn loop_cursor(&self) -> &LoopCursor {
        &self.cursor
    }

    pub fn stats(&self) -> StreamSheetStats {
        self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut StreamSheetStats {
        &mut self.stats
    }

    pub fn suspension(&self) -> &Suspension {
        &self.suspension
    }

    /// Halted mid-recalculation, waiting to continue
    pub fn is_halted(&self) -> bool {
        self.resume_at.is_some()
    }

    /// Message used by the last step
    pub fn current_message(&self) -> Option<&Message> {
        self.current.as_ref()
    }

    pub(crate) fn set_explicit_message(&mut self, message: Option<Message>) {
        self.explicit_message = message;
        self.cursor.reset();
    }

    /// Deliver the result of the `execute()` call made from `cell`
    pub(crate) fn resolve_execute(&mut self, cell: usize, value: Value) {
        self.execute_results.insert(cell, value);
    }

    pub fn add_dispose_listener(&mut self, listener: DisposeListener) {
        self.dispose_listeners.push(listener);
    }

    /// Run one step. A step started while another is in flight is an error.
    pub fn process_step(&mut self, mode: StepMode, env: &mut StepEnv<'_>) -> Result<StepOutcome> {
        if self.in_step {
            return Err(EngineError::Reentrant(self.name.clone()));
        }
        if self.suspension.is_active() {
            log::debug!("{}: step skipped, suspended ({})", self.name, self.suspension.reason());
            return Ok(StepOutcome::Skipped);
        }
        let from = match mode {
            StepMode::Resume => match self.resume_at.take() {
                Some(at) => at,
                None => return Ok(StepOutcome::Skipped),
            },
            _ => {
                self.resume_at = None;
                self.execute_results.clear();
                self.begin_step(mode);
                0
            }
        };

        self.in_step = true;
        let result = self.recalculate(from, env);
        self.in_step = false;
        let effects = result?;
        Ok(self.complete_step(effects))
    }

    fn begin_step(&mut self, mode: StepMode) {
        match mode {
            StepMode::Admitted => self.stats.admitted(),
            StepMode::Repeat => self.stats.repeated(),
            StepMode::ExecuteRepetition => self.stats.execute_repetition(),
            StepMode::ExecuteSubStep => self.stats.execute_substep(self.trigger.is_endless()),
            StepMode::Resume => {}
        }

        let (message, consumed) = match &self.explicit_message {
            Some(message) => (Some(message.clone()), false),
            None => {
                let message = self.inbox.select().cloned();
                (message, self.inbox.is_front_processed())
            }
        };

        // a consumed message is visible to the sheet but not iterated again
        match &message {
            Some(m) if self.loop_settings.enabled && !consumed => {
                let length = m.loop_length(&self.loop_settings.path);
                self.cursor.advance(m.id(), length);
            }
            _ => self.cursor.reset(),
        }
        self.current = message;
    }

    fn recalculate(&mut self, from: usize, env: &mut StepEnv<'_>) -> Result<StepEffects> {
        let inbox_ids = self.inbox.ids();
        let looping = self.cursor.is_active();
        let index = self.cursor.index();
        let element = if looping {
            self.current
                .as_ref()
                .and_then(|m| m.loop_element(&self.loop_settings.path, index))
        } else {
            None
        };

        let mut ctx = StepContext::new(
            &self.name,
            env.directory,
            &mut self.execute_results,
            &mut *env.requests,
        )
        .with_message(self.current.as_ref())
        .with_inbox_ids(&inbox_ids)
        .with_stats(self.stats)
        .with_now(env.now);
        if looping {
            ctx = ctx.with_loop(index, element);
        }

        self.sheet.recalculate(from, &mut ctx)?;
        Ok(ctx.into_effects())
    }

    fn complete_step(&mut self, effects: StepEffects) -> StepOutcome {
        if let Some(halt) = effects.halt {
            self.resume_at = Some(halt.resume_at());
            return match halt {
                Halt::Execute { cell, call } => StepOutcome::Halted(HaltReason::Execute { cell, call }),
                other => {
                    self.suspension = Suspension::from_halt(&other);
                    self.trigger.set_state(TriggerState::Suspended);
                    log::debug!("{}: suspended on {}", self.name, self.suspension.reason());
                    StepOutcome::Halted(HaltReason::Suspended)
                }
            };
        }

        let returned = effects.returned.is_some();
        let value = effects.returned.flatten();
        let finished = returned || !self.cursor.is_active() || self.cursor.is_last();
        if finished {
            if self.explicit_message.is_none() {
                self.inbox.mark_processed();
            }
            self.cursor.reset();
            self.stats.finished();
        }
        StepOutcome::Completed {
            finished,
            returned,
            value,
        }
    }

    /// Suspend processing until [`resume_processing`](Self::resume_processing).
    /// Replaces any other suspension reason.
    pub fn pause_processing(&mut self) {
        self.suspension = Suspension::Paused;
        self.trigger.set_state(TriggerState::Suspended);
    }

    /// Lift the suspension. Returns true when a halted recalculation is
    /// waiting to continue; the caller schedules it.
    pub fn resume_processing(&mut self) -> bool {
        let was_suspended = self.suspension.is_active();
        self.suspension = Suspension::None;
        if self.resume_at.is_some() {
            self.trigger.set_state(TriggerState::Processing);
            true
        } else {
            if was_suspended {
                self.trigger.set_state(TriggerState::Idle);
            }
            false
        }
    }

    /// Mark the sheet for another step without admission. Not possible while
    /// suspended.
    pub fn repeat_processing(&mut self) -> bool {
        if self.suspension.is_active() {
            return false;
        }
        self.trigger.set_state(TriggerState::Processing);
        true
    }

    /// Continue the next step at cell `index` instead of the first cell
    pub fn continue_processing_at(&mut self, index: usize) {
        self.resume_at = Some(index);
        self.trigger.set_state(TriggerState::Processing);
    }

    /// Abandon any halted step and suspension and go back to idle
    pub fn stop_processing(&mut self) {
        self.suspension = Suspension::None;
        self.resume_at = None;
        self.execute_results.clear();
        self.explicit_message = None;
        self.cursor.reset();
        self.trigger.set_state(TriggerState::Idle);
    }

    /// Install a trigger configuration.
    ///
    /// An equivalent configuration (same type and repeat mode) is applied in
    /// place and the state is kept; returns true. Anything else replaces the
    /// trigger and resets processing; returns false.
    pub(crate) fn replace_trigger(&mut self, config: TriggerConfig) -> Result<bool> {
        if self.trigger.is_equivalent(&config) {
            self.trigger.reconfigure(config)?;
            return Ok(true);
        }
        let mut trigger = Trigger::from_config(config)?;
        trigger.bind(&self.name)?;
        self.trigger = trigger;
        self.stop_processing();
        Ok(false)
    }

    /// Release the StreamSheet and notify dispose listeners
    pub(crate) fn dispose(mut self) {
        self.stop_processing();
        self.trigger.disarm();
        for listener in self.dispose_listeners.drain(..) {
            listener(&self.name);
        }
    }
}
