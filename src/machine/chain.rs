//! Driving `execute()` frames.
//!
//! A caller halts on its `execute()` cell and gets `#WAITING`. The callee then
//! runs its repetitions at the frame's pace. When the last one is done the
//! result is stored for the caller's cell and the caller is resumed through
//! the work queue; it never gets called back directly.

use crate::error::Result;
use crate::execute::{ExecuteCall, ExecuteFrame, Pace, PendingCall, TurnKind};
use crate::machine::{Machine, Work};
use crate::sheet::{ErrorCode, Value};
use crate::streamsheet::StepMode;
use crate::trigger::TriggerState;

impl Machine {
    /// Start, queue or reject an `execute()` call made from `caller`'s `cell`
    pub(super) fn begin_execute(&mut self, caller: &str, cell: usize, call: ExecuteCall) -> Result<()> {
        if self.position(caller).is_none() {
            return Ok(());
        }
        let target = call.target.clone();
        if self.position(&target).is_none() {
            return self.resolve_caller(caller, cell, Value::Error(ErrorCode::NoStreamSheet));
        }
        if self.bridge.would_cycle(caller, &target) {
            log::warn!("{}: execute({}) would form a cycle", caller, target);
            return self.resolve_caller(caller, cell, Value::Error(ErrorCode::InvalidParam));
        }
        let depth = self.bridge.depth_for(caller);
        if depth > self.settings.max_chain_depth {
            log::warn!(
                "{}: execute({}) exceeds chain depth {}",
                caller,
                target,
                self.settings.max_chain_depth
            );
            return self.resolve_caller(caller, cell, Value::Error(ErrorCode::InvalidParam));
        }
        if self.bridge.is_busy(&target) {
            log::debug!("{}: execute({}) queued, target busy", caller, target);
            self.bridge.enqueue(PendingCall {
                caller: caller.to_string(),
                cell,
                call,
            });
            return Ok(());
        }

        let pace = Pace::from_speed(call.speed_ms, self.settings.cycletime_ms);
        let frame = ExecuteFrame::new(caller, cell, &call, pace, depth);
        if let Some(callee) = self.streamsheet_mut(&target) {
            if callee.suspension().is_active() || callee.is_halted() {
                callee.stop_processing();
            }
            callee.stats_mut().begin_execution();
            callee.set_explicit_message(call.message);
            callee.trigger_mut().set_state(TriggerState::Processing);
        }
        log::debug!(
            "{}: execute({}) x{} at depth {}",
            caller,
            target,
            frame.repetitions,
            depth
        );
        self.bridge.push(frame);
        self.work.push_front(Work::ExecuteTurn(target));
        Ok(())
    }

    /// Run the pending callee step of the frame driving `callee`
    pub(super) fn run_execute_turn(&mut self, callee: &str) -> Result<()> {
        if self
            .streamsheet(callee)
            .is_some_and(|s| s.suspension().is_active())
        {
            let cycle = self.cycle;
            if let Some(frame) = self.bridge.frame_for_mut(callee) {
                frame.defer(cycle);
            }
            return Ok(());
        }
        let Some(kind) = self.bridge.frame_for_mut(callee).and_then(|f| f.take_turn()) else {
            return Ok(());
        };
        let mode = match kind {
            TurnKind::Repetition => StepMode::ExecuteRepetition,
            TurnKind::SubStep => StepMode::ExecuteSubStep,
        };
        self.run_step(callee, mode)
    }

    /// A callee step completed. An endless callee finishes a repetition by
    /// returning; a once callee when its message is done.
    pub(super) fn on_callee_completed(
        &mut self,
        callee: &str,
        finished: bool,
        returned: bool,
        value: Option<Value>,
    ) -> Result<()> {
        let endless = self
            .streamsheet(callee)
            .is_some_and(|s| s.trigger().is_endless());
        let cycle = self.cycle;
        let now = self.clock.now_ms();
        let Some(frame) = self.bridge.frame_for_mut(callee) else {
            return Ok(());
        };
        frame.record(returned, value);

        let repetition_done = if endless { returned } else { finished };
        let next = if repetition_done {
            if frame.complete_repetition() {
                return self.finish_execute(callee);
            }
            TurnKind::Repetition
        } else {
            TurnKind::SubStep
        };
        if frame.schedule(next, cycle, now) {
            self.work.push_front(Work::ExecuteTurn(callee.to_string()));
        }
        Ok(())
    }

    fn finish_execute(&mut self, callee: &str) -> Result<()> {
        let Some(frame) = self.bridge.remove(callee) else {
            return Ok(());
        };
        if let Some(sheet) = self.streamsheet_mut(callee) {
            sheet.set_explicit_message(None);
            let state = if frame.last_returned {
                TriggerState::Returned
            } else {
                TriggerState::Idle
            };
            sheet.trigger_mut().set_state(state);
        }
        log::debug!(
            "{}: execute({}) done after {} repetition(s)",
            frame.caller,
            callee,
            frame.completed
        );
        self.resolve_caller(&frame.caller, frame.caller_cell, frame.result())?;
        if let Some(pending) = self.bridge.take_queued(callee) {
            self.begin_execute(&pending.caller, pending.cell, pending.call)?;
        }
        Ok(())
    }

    /// Hand `value` to the caller's `execute()` cell and schedule its resume
    fn resolve_caller(&mut self, caller: &str, cell: usize, value: Value) -> Result<()> {
        if let Some(sheet) = self.streamsheet_mut(caller) {
            sheet.resolve_execute(cell, value);
            self.work.push_front(Work::Resume(caller.to_string()));
        }
        Ok(())
    }

    fn abandon(&mut self, name: &str) {
        if let Some(sheet) = self.streamsheet_mut(name) {
            sheet.stop_processing();
        }
    }

    /// Cancel every frame and queued call; callers and callees go idle
    pub(super) fn cancel_frames(&mut self) {
        let (frames, queued) = self.bridge.clear();
        for frame in frames {
            log::debug!("{}: execute({}) cancelled", frame.caller, frame.callee);
            self.abandon(&frame.callee);
            self.abandon(&frame.caller);
        }
        for pending in queued {
            self.abandon(&pending.caller);
        }
        self.work.retain(|w| !matches!(w, Work::ExecuteTurn(_)));
    }

    /// Detach `name` from the execute graph. A caller waiting on it receives
    /// `code`; calls it made are dropped together with everything below them.
    pub(super) fn cancel_execute_involving(&mut self, name: &str, code: ErrorCode) -> Result<()> {
        if let Some(frame) = self.bridge.remove(name) {
            self.resolve_caller(&frame.caller, frame.caller_cell, Value::Error(code))?;
        }
        let mut current = name.to_string();
        while let Some(frame) = self
            .bridge
            .frames()
            .iter()
            .find(|f| f.caller == current)
            .cloned()
        {
            self.bridge.remove(&frame.callee);
            self.abandon(&frame.callee);
            current = frame.callee;
        }
        for pending in self.bridge.take_queued_involving(name) {
            if pending.caller != name {
                self.resolve_caller(&pending.caller, pending.cell, Value::Error(code))?;
            }
        }
        self.work
            .retain(|w| !matches!(w, Work::ExecuteTurn(callee) if callee == name));
        Ok(())
    }
}
