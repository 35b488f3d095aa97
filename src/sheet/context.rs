//! The view a sheet engine gets of the StreamSheet while recalculating.
//!
//! Formula implementations call into [`StepContext`] for everything that
//! touches scheduling: `return()`, `pause()`, `sleep()`, `await()`,
//! `execute()`, `loopindices()`, `messageids()`. Side effects are recorded
//! here and applied by the StreamSheet after the recalculation returns.

use std::collections::HashMap;

use crate::execute::ExecuteCall;
use crate::message::Message;
use crate::requests::{AwaitMode, RequestRegistry};
use crate::sheet::{ErrorCode, Value};
use crate::streamsheet::StreamSheetStats;
use crate::trigger::TriggerKind;

/// Name and trigger type of a StreamSheet reachable from `execute()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub kind: TriggerKind,
}

/// Why a recalculation stopped before its last cell
#[derive(Debug, Clone, PartialEq)]
pub enum Halt {
    Pause { cell: usize },
    Sleep { cell: usize, until: u64 },
    Await { cell: usize, ids: Vec<String>, mode: AwaitMode },
    Execute { cell: usize, call: ExecuteCall },
}

impl Halt {
    /// Cell index at which recalculation continues once the halt is lifted.
    ///
    /// `await()` and `execute()` cells are evaluated again to pick up their
    /// result; `pause()` and `sleep()` continue behind the cell.
    pub fn resume_at(&self) -> usize {
        match self {
            Halt::Pause { cell } | Halt::Sleep { cell, .. } => cell + 1,
            Halt::Await { cell, .. } | Halt::Execute { cell, .. } => *cell,
        }
    }
}

/// Side effects collected during one recalculation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepEffects {
    /// Set when `return()` ran; holds its optional value
    pub returned: Option<Option<Value>>,
    pub halt: Option<Halt>,
}

/// Per-recalculation context handed to [`crate::sheet::Sheet::recalculate`]
pub struct StepContext<'a> {
    sheet: &'a str,
    directory: &'a [SheetEntry],
    execute_results: &'a mut HashMap<usize, Value>,
    requests: &'a mut RequestRegistry,
    message: Option<&'a Message>,
    loop_index: Option<usize>,
    loop_element: Option<&'a serde_json::Value>,
    inbox_ids: &'a [String],
    stats: StreamSheetStats,
    now: u64,
    effects: StepEffects,
}

impl<'a> StepContext<'a> {
    pub fn new(
        sheet: &'a str,
        directory: &'a [SheetEntry],
        execute_results: &'a mut HashMap<usize, Value>,
        requests: &'a mut RequestRegistry,
    ) -> Self {
        Self {
            sheet,
            directory,
            execute_results,
            requests,
            message: None,
            loop_index: None,
            loop_element: None,
            inbox_ids: &[],
            stats: StreamSheetStats::default(),
            now: 0,
            effects: StepEffects::default(),
        }
    }

    pub fn with_message(mut self, message: Option<&'a Message>) -> Self {
        self.message = message;
        self
    }

    pub fn with_loop(mut self, index: usize, element: Option<&'a serde_json::Value>) -> Self {
        self.loop_index = Some(index);
        self.loop_element = element;
        self
    }

    pub fn with_inbox_ids(mut self, ids: &'a [String]) -> Self {
        self.inbox_ids = ids;
        self
    }

    pub fn with_stats(mut self, stats: StreamSheetStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_now(mut self, now: u64) -> Self {
        self.now = now;
        self
    }

    pub fn sheet_name(&self) -> &str {
        self.sheet
    }

    pub fn message(&self) -> Option<&Message> {
        self.message
    }

    /// Current loop element, or the whole payload when not looping
    pub fn data(&self) -> Option<&serde_json::Value> {
        self.loop_element.or_else(|| self.message.map(|m| m.data()))
    }

    /// `loopindices()`: index into the current message's loop, if looping
    pub fn loop_index(&self) -> Option<usize> {
        self.loop_index
    }

    /// `messageids()`: ids of all messages in the inbox
    pub fn message_ids(&self) -> &[String] {
        self.inbox_ids
    }

    pub fn stats(&self) -> StreamSheetStats {
        self.stats
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// True once `return()` ran or a suspension point was hit. The engine
    /// must not evaluate further cells.
    pub fn is_stopped(&self) -> bool {
        self.effects.returned.is_some() || self.effects.halt.is_some()
    }

    pub fn has_returned(&self) -> bool {
        self.effects.returned.is_some()
    }

    /// `return(value?)`: finish this step and end an endless repeat
    pub fn return_value(&mut self, value: Option<Value>) -> Value {
        if self.effects.halt.is_none() {
            self.effects.returned = Some(value);
        }
        Value::Bool(true)
    }

    /// `pause()`: suspend until resumed from outside
    pub fn pause(&mut self, cell: usize) -> Value {
        self.halt(Halt::Pause { cell });
        Value::Bool(true)
    }

    /// `sleep(seconds)`: suspend, resuming once the time has passed
    pub fn sleep(&mut self, cell: usize, seconds: f64) -> Value {
        if seconds <= 0.0 || !seconds.is_finite() {
            return Value::Bool(true);
        }
        // float to int casts saturate, so huge durations clamp to u64::MAX
        let until = self.now.saturating_add((seconds * 1000.0).round() as u64);
        self.halt(Halt::Sleep { cell, until });
        Value::Bool(true)
    }

    /// `await(ids)` / `await.one(ids)`: suspend while the requests are pending
    pub fn await_requests(&mut self, cell: usize, ids: Vec<String>, mode: AwaitMode) -> Value {
        if self.requests.is_satisfied(&ids, mode) {
            return Value::Bool(true);
        }
        self.halt(Halt::Await { cell, ids, mode });
        Value::Bool(false)
    }

    /// Register an asynchronous request and return its id
    pub fn create_request(&mut self, label: &str) -> String {
        self.requests.create(label)
    }

    /// `execute(target, repetitions, message?, speed?)`
    ///
    /// Returns the resolved value when the call made from this cell has
    /// finished; otherwise validates the call, halts the recalculation and
    /// returns `#WAITING`.
    pub fn execute(&mut self, cell: usize, call: ExecuteCall) -> Value {
        if let Some(value) = self.execute_results.remove(&cell) {
            return value;
        }
        if call.repetitions == 0 || call.target == self.sheet {
            return Value::Error(ErrorCode::InvalidParam);
        }
        match self.directory.iter().find(|e| e.name == call.target) {
            None => Value::Error(ErrorCode::NoStreamSheet),
            Some(entry) if entry.kind != TriggerKind::Execute => Value::Error(ErrorCode::InvalidParam),
            Some(_) => {
                self.halt(Halt::Execute { cell, call });
                Value::Error(ErrorCode::Waiting)
            }
        }
    }

    fn halt(&mut self, halt: Halt) {
        if !self.is_stopped() {
            self.effects.halt = Some(halt);
        }
    }

    /// Collected side effects
    pub fn into_effects(self) -> StepEffects {
        self.effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> Vec<SheetEntry> {
        vec![
            SheetEntry {
                name: "S1".into(),
                kind: TriggerKind::Continuously,
            },
            SheetEntry {
                name: "S2".into(),
                kind: TriggerKind::Execute,
            },
        ]
    }

    #[test]
    fn test_execute_halts_with_waiting() {
        let dir = directory();
        let mut results = HashMap::new();
        let mut reqs = RequestRegistry::new();
        let mut ctx = StepContext::new("S1", &dir, &mut results, &mut reqs);
        let value = ctx.execute(3, ExecuteCall::new("S2"));
        assert_eq!(value, Value::Error(ErrorCode::Waiting));
        assert!(ctx.is_stopped());
        let effects = ctx.into_effects();
        assert_eq!(effects.halt.unwrap().resume_at(), 3);
    }

    #[test]
    fn test_execute_rejects_non_execute_target() {
        let dir = directory();
        let mut results = HashMap::new();
        let mut reqs = RequestRegistry::new();
        let mut ctx = StepContext::new("S2", &dir, &mut results, &mut reqs);
        assert_eq!(
            ctx.execute(0, ExecuteCall::new("S1")),
            Value::Error(ErrorCode::InvalidParam)
        );
        assert_eq!(
            ctx.execute(0, ExecuteCall::new("S9")),
            Value::Error(ErrorCode::NoStreamSheet)
        );
        assert_eq!(
            ctx.execute(0, ExecuteCall::new("S2")),
            Value::Error(ErrorCode::InvalidParam)
        );
        assert!(!ctx.is_stopped());
    }

    #[test]
    fn test_execute_returns_resolved_value_once() {
        let dir = directory();
        let mut results = HashMap::new();
        results.insert(1, Value::Bool(false));
        let mut reqs = RequestRegistry::new();
        let mut ctx = StepContext::new("S1", &dir, &mut results, &mut reqs);
        assert_eq!(ctx.execute(1, ExecuteCall::new("S2")), Value::Bool(false));
        assert!(!ctx.is_stopped());
        drop(ctx);
        assert!(results.is_empty());
    }

    #[test]
    fn test_sleep_zero_does_not_halt() {
        let dir = directory();
        let mut results = HashMap::new();
        let mut reqs = RequestRegistry::new();
        let mut ctx = StepContext::new("S1", &dir, &mut results, &mut reqs).with_now(1_000);
        ctx.sleep(0, 0.0);
        assert!(!ctx.is_stopped());
        ctx.sleep(2, 1.5);
        assert_eq!(
            ctx.into_effects().halt,
            Some(Halt::Sleep { cell: 2, until: 2_500 })
        );
    }

    #[test]
    fn test_sleep_huge_duration_saturates() {
        let dir = directory();
        let mut results = HashMap::new();
        let mut reqs = RequestRegistry::new();
        let mut ctx = StepContext::new("S1", &dir, &mut results, &mut reqs).with_now(1_000);
        ctx.sleep(0, 1e300);
        assert_eq!(
            ctx.into_effects().halt,
            Some(Halt::Sleep { cell: 0, until: u64::MAX })
        );
    }

    #[test]
    fn test_first_stop_wins() {
        let dir = directory();
        let mut results = HashMap::new();
        let mut reqs = RequestRegistry::new();
        let mut ctx = StepContext::new("S1", &dir, &mut results, &mut reqs);
        ctx.pause(0);
        ctx.return_value(Some(Value::Number(1.0)));
        let effects = ctx.into_effects();
        assert_eq!(effects.halt, Some(Halt::Pause { cell: 0 }));
        assert!(effects.returned.is_none());
    }

    #[test]
    fn test_await_satisfied_requests_do_not_halt() {
        let dir = directory();
        let mut results = HashMap::new();
        let mut reqs = RequestRegistry::new();
        let id = reqs.create("x");
        reqs.resolve(&id);
        let mut ctx = StepContext::new("S1", &dir, &mut results, &mut reqs);
        assert_eq!(ctx.await_requests(0, vec![id], AwaitMode::All), Value::Bool(true));
        assert!(!ctx.is_stopped());
    }
}
