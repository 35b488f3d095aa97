//! One active `execute()` invocation

use crate::message::Message;
use crate::sheet::Value;

/// Arguments of an `execute(target, repetitions, message?, speed?)` call
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteCall {
    pub target: String,
    pub repetitions: u32,
    /// Processed by the callee instead of its own inbox
    pub message: Option<Message>,
    /// Pacing of callee steps; `None` follows the machine cycle
    pub speed_ms: Option<u64>,
}

impl ExecuteCall {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            repetitions: 1,
            message: None,
            speed_ms: None,
        }
    }

    pub fn with_repetitions(mut self, repetitions: u32) -> Self {
        self.repetitions = repetitions;
        self
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }

    pub fn with_speed(mut self, speed_ms: u64) -> Self {
        self.speed_ms = Some(speed_ms);
        self
    }
}

/// How fast consecutive callee steps follow each other
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// One callee step per machine cycle
    Cycle,
    /// All callee steps back to back, bounded by the turn budget
    Immediate,
    /// One callee step every n milliseconds
    Every(u64),
}

impl Pace {
    /// Faster than the cycle runs immediately, slower runs on its own timer
    pub fn from_speed(speed_ms: Option<u64>, cycletime_ms: u64) -> Self {
        match speed_ms {
            None => Pace::Cycle,
            Some(ms) if ms == cycletime_ms => Pace::Cycle,
            Some(ms) if ms < cycletime_ms => Pace::Immediate,
            Some(ms) => Pace::Every(ms),
        }
    }
}

/// What the next callee step starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    /// A new repetition
    Repetition,
    /// Another step inside the current repetition (endless repeat or loop)
    SubStep,
}

/// When the frame's next callee step may run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameWait {
    /// A callee step is in flight or halted
    Running,
    /// Queued on the machine's work queue
    Immediate(TurnKind),
    /// On the first machine cycle after `after_cycle`
    NextTick { kind: TurnKind, after_cycle: u64 },
    /// Once the clock reaches `due`
    At { kind: TurnKind, due: u64 },
}

/// Bookkeeping for one caller/callee pair
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteFrame {
    pub caller: String,
    /// Cell in the caller whose `execute()` receives the result
    pub caller_cell: usize,
    pub callee: String,
    pub repetitions: u32,
    pub completed: u32,
    pub pace: Pace,
    /// Position in the execute chain; 1 for a call from a top-level sheet
    pub depth: usize,
    pub wait: FrameWait,
    pub last_returned: bool,
    pub last_value: Option<Value>,
}

impl ExecuteFrame {
    pub fn new(caller: &str, caller_cell: usize, call: &ExecuteCall, pace: Pace, depth: usize) -> Self {
        Self {
            caller: caller.to_string(),
            caller_cell,
            callee: call.target.clone(),
            repetitions: call.repetitions.max(1),
            completed: 0,
            pace,
            depth,
            wait: FrameWait::Immediate(TurnKind::Repetition),
            last_returned: false,
            last_value: None,
        }
    }

    /// Record the outcome of a callee step
    pub fn record(&mut self, returned: bool, value: Option<Value>) {
        self.last_returned = returned;
        if value.is_some() {
            self.last_value = value;
        }
    }

    /// Count a finished repetition. True when all are done.
    pub fn complete_repetition(&mut self) -> bool {
        self.completed += 1;
        self.completed >= self.repetitions
    }

    /// Value handed back to the caller's `execute()` cell
    pub fn result(&self) -> Value {
        self.last_value
            .clone()
            .unwrap_or(Value::Bool(self.last_returned))
    }

    /// Schedule the next callee step according to the pace. Returns true if
    /// it should run right away.
    pub fn schedule(&mut self, kind: TurnKind, cycle: u64, now: u64) -> bool {
        self.wait = match self.pace {
            Pace::Cycle => FrameWait::NextTick {
                kind,
                after_cycle: cycle,
            },
            Pace::Immediate => FrameWait::Immediate(kind),
            Pace::Every(ms) => FrameWait::At { kind, due: now + ms },
        };
        matches!(self.wait, FrameWait::Immediate(_))
    }

    /// Push an immediate step to the next cycle
    pub fn defer(&mut self, cycle: u64) {
        if let FrameWait::Immediate(kind) = self.wait {
            self.wait = FrameWait::NextTick {
                kind,
                after_cycle: cycle,
            };
        }
    }

    /// Claim the pending step, marking the frame running
    pub fn take_turn(&mut self) -> Option<TurnKind> {
        let kind = match self.wait {
            FrameWait::Running => return None,
            FrameWait::Immediate(kind)
            | FrameWait::NextTick { kind, .. }
            | FrameWait::At { kind, .. } => kind,
        };
        self.wait = FrameWait::Running;
        Some(kind)
    }

    pub fn is_due_on_cycle(&self, cycle: u64) -> bool {
        matches!(self.wait, FrameWait::NextTick { after_cycle, .. } if cycle > after_cycle)
    }

    pub fn is_due_at(&self, now: u64) -> bool {
        matches!(self.wait, FrameWait::At { due, .. } if now >= due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pace_from_speed() {
        assert_eq!(Pace::from_speed(None, 50), Pace::Cycle);
        assert_eq!(Pace::from_speed(Some(50), 50), Pace::Cycle);
        assert_eq!(Pace::from_speed(Some(0), 50), Pace::Immediate);
        assert_eq!(Pace::from_speed(Some(200), 50), Pace::Every(200));
    }

    #[test]
    fn test_result_prefers_returned_value() {
        let mut frame = ExecuteFrame::new("S1", 0, &ExecuteCall::new("S2"), Pace::Cycle, 1);
        assert_eq!(frame.result(), Value::Bool(false));
        frame.record(true, None);
        assert_eq!(frame.result(), Value::Bool(true));
        frame.record(true, Some(Value::Number(42.0)));
        frame.record(false, None);
        assert_eq!(frame.result(), Value::Number(42.0));
    }

    #[test]
    fn test_repetitions() {
        let call = ExecuteCall::new("S2").with_repetitions(2);
        let mut frame = ExecuteFrame::new("S1", 0, &call, Pace::Cycle, 1);
        assert!(!frame.complete_repetition());
        assert!(frame.complete_repetition());
    }

    #[test]
    fn test_cycle_pace_waits_for_next_cycle() {
        let mut frame = ExecuteFrame::new("S1", 0, &ExecuteCall::new("S2"), Pace::Cycle, 1);
        assert_eq!(frame.take_turn(), Some(TurnKind::Repetition));
        assert_eq!(frame.take_turn(), None);
        assert!(!frame.schedule(TurnKind::SubStep, 4, 0));
        assert!(!frame.is_due_on_cycle(4));
        assert!(frame.is_due_on_cycle(5));
        assert_eq!(frame.take_turn(), Some(TurnKind::SubStep));
    }

    #[test]
    fn test_timed_pace() {
        let mut frame = ExecuteFrame::new("S1", 0, &ExecuteCall::new("S2"), Pace::Every(100), 1);
        frame.take_turn();
        assert!(!frame.schedule(TurnKind::Repetition, 1, 1_000));
        assert!(!frame.is_due_at(1_099));
        assert!(frame.is_due_at(1_100));
    }

    #[test]
    fn test_defer_immediate() {
        let mut frame = ExecuteFrame::new("S1", 0, &ExecuteCall::new("S2"), Pace::Immediate, 1);
        frame.take_turn();
        assert!(frame.schedule(TurnKind::SubStep, 7, 0));
        frame.defer(7);
        assert!(frame.is_due_on_cycle(8));
    }
}
