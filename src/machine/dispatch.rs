//! Step dispatch: cycles, admissions, repeats and the work queue

use crate::error::Result;
use crate::machine::{Machine, MachineEvent, RunState, Work};
use crate::streamsheet::{HaltReason, StepEnv, StepMode, StepOutcome};
use crate::trigger::{AdmissionEvent, TriggerState};

impl Machine {
    /// Run one step of `name` and apply its outcome
    pub(super) fn run_step(&mut self, name: &str, mode: StepMode) -> Result<()> {
        let directory = self.directory();
        let now = self.clock.now_ms();
        let Some(sheet) = self.sheets.iter_mut().find(|s| s.name() == name) else {
            return Ok(());
        };
        let mut env = StepEnv {
            now,
            directory: &directory,
            requests: &mut self.requests,
        };
        let outcome = sheet.process_step(mode, &mut env)?;
        log::trace!("{}: {:?} -> {:?}", name, mode, outcome);
        self.after_step(name, outcome)
    }

    fn after_step(&mut self, name: &str, outcome: StepOutcome) -> Result<()> {
        match outcome {
            StepOutcome::Skipped | StepOutcome::Halted(HaltReason::Suspended) => Ok(()),
            StepOutcome::Halted(HaltReason::Execute { cell, call }) => {
                if let Some(sheet) = self.streamsheet_mut(name) {
                    sheet.trigger_mut().set_state(TriggerState::Processing);
                }
                self.begin_execute(name, cell, call)
            }
            StepOutcome::Completed {
                finished,
                returned,
                value,
            } => {
                if self.bridge.is_busy(name) {
                    return self.on_callee_completed(name, finished, returned, value);
                }
                let Some(sheet) = self.streamsheet_mut(name) else {
                    return Ok(());
                };
                let repeat = sheet.trigger().is_endless() && !returned;
                let state = match (repeat, returned) {
                    (true, _) => TriggerState::Processing,
                    (false, true) => TriggerState::Returned,
                    (false, false) => TriggerState::Idle,
                };
                sheet.trigger_mut().set_state(state);
                if repeat && !self.repeats.iter().any(|n| n == name) {
                    self.repeats.push_back(name.to_string());
                }
                Ok(())
            }
        }
    }

    /// Run an admitted step and everything it causes
    pub(super) fn admit(&mut self, name: &str) -> Result<()> {
        self.run_step(name, StepMode::Admitted)?;
        self.drain_work()
    }

    fn admits(&self, name: &str, event: AdmissionEvent) -> bool {
        if self.bridge.is_busy(name) {
            return false;
        }
        self.streamsheet(name).is_some_and(|s| {
            s.trigger().admits(event, s.inbox().has_unprocessed())
        })
    }

    /// Drain the work queue. Execute turns beyond the turn budget move to the
    /// next cycle.
    pub(super) fn drain_work(&mut self) -> Result<()> {
        let mut turns = 0usize;
        while let Some(work) = self.work.pop_front() {
            match work {
                Work::Resume(name) => self.run_step(&name, StepMode::Resume)?,
                Work::ExecuteTurn(callee) => {
                    turns += 1;
                    if turns > self.settings.turn_budget {
                        log::debug!("{}: turn budget spent, continuing next cycle", callee);
                        let cycle = self.cycle;
                        if let Some(frame) = self.bridge.frame_for_mut(&callee) {
                            frame.defer(cycle);
                        }
                        continue;
                    }
                    self.run_execute_turn(&callee)?;
                }
            }
        }
        Ok(())
    }

    /// One pass over all StreamSheets in registration order
    pub(super) fn run_cycle(&mut self, event: AdmissionEvent) -> Result<()> {
        self.cycle += 1;
        self.steps += 1;
        self.wake_ready()?;

        let names: Vec<String> = self.sheets.iter().map(|s| s.name().to_string()).collect();
        for name in &names {
            let cycle = self.cycle;
            if self.bridge.frame_for(name).is_some_and(|f| f.is_due_on_cycle(cycle)) {
                self.run_execute_turn(name)?;
            } else if event == AdmissionEvent::ManualStep && self.take_repeat(name) {
                self.run_step(name, StepMode::Repeat)?;
            } else if self.admits(name, event) {
                self.run_step(name, StepMode::Admitted)?;
            }
            self.drain_work()?;
            if event == AdmissionEvent::ManualStep {
                self.repeat_within_step(name)?;
            }
        }

        log::debug!("Machine {}: step {}", self.name, self.steps);
        self.emit(MachineEvent::StepPassed { steps: self.steps });
        Ok(())
    }

    /// Resume StreamSheets whose sleep or await is over and run timed
    /// execute turns that are due
    pub(super) fn wake_ready(&mut self) -> Result<()> {
        let now = self.clock.now_ms();
        let ready: Vec<String> = self
            .sheets
            .iter()
            .filter(|s| s.suspension().is_ready(now, &self.requests))
            .map(|s| s.name().to_string())
            .collect();
        for name in ready {
            log::debug!("{}: waking up", name);
            self.resume_streamsheet(&name)?;
        }
        for callee in self.bridge.due_at(now) {
            self.run_execute_turn(&callee)?;
            self.drain_work()?;
        }
        Ok(())
    }

    /// Admit every StreamSheet whose trigger reacts to a lifecycle event
    pub(super) fn fire_event(&mut self, event: AdmissionEvent) -> Result<()> {
        let names: Vec<String> = self
            .sheets
            .iter()
            .map(|s| s.name().to_string())
            .filter(|n| self.admits(n, event))
            .collect();
        for name in names {
            self.admit(&name)?;
        }
        Ok(())
    }

    /// Fire due timer triggers and wake sleeping StreamSheets
    pub fn advance_timers(&mut self) -> Result<()> {
        self.wake_ready()?;
        let now = self.clock.now_ms();
        let due: Vec<String> = self
            .sheets
            .iter_mut()
            .filter_map(|s| {
                s.trigger_mut()
                    .fire_if_due(now)
                    .then(|| s.name().to_string())
            })
            .collect();
        for name in due {
            if self.admits(&name, AdmissionEvent::TimerDue) {
                self.admit(&name)?;
            }
        }
        Ok(())
    }

    /// Endless repeats are waiting
    pub fn has_repeats(&self) -> bool {
        !self.repeats.is_empty()
    }

    /// Run up to `budget` endless repeats round robin. Only while running.
    pub fn drain_repeats(&mut self, budget: usize) -> Result<usize> {
        if self.state != RunState::Running {
            return Ok(0);
        }
        let mut ran = 0;
        while ran < budget {
            let Some(name) = self.repeats.pop_front() else {
                break;
            };
            if !self.can_repeat(&name) {
                continue;
            }
            self.run_step(&name, StepMode::Repeat)?;
            self.drain_work()?;
            ran += 1;
        }
        Ok(ran)
    }

    fn can_repeat(&self, name: &str) -> bool {
        !self.bridge.is_busy(name)
            && self.streamsheet(name).is_some_and(|s| {
                s.trigger().state() == TriggerState::Processing
                    && !s.suspension().is_active()
                    && !s.is_halted()
            })
    }

    /// Keep an endless StreamSheet repeating inside one manual step until it
    /// returns, suspends or waits on a callee. Repeats beyond the turn budget
    /// stay queued for the next step or the runner.
    fn repeat_within_step(&mut self, name: &str) -> Result<()> {
        let mut turns = 0usize;
        while self.repeats.iter().any(|n| n == name) {
            if turns >= self.settings.turn_budget {
                log::debug!("{}: turn budget spent, repeat continues later", name);
                break;
            }
            if !self.take_repeat(name) {
                break;
            }
            self.run_step(name, StepMode::Repeat)?;
            self.drain_work()?;
            turns += 1;
        }
        Ok(())
    }

    /// Take a pending repeat for a manual step
    fn take_repeat(&mut self, name: &str) -> bool {
        let queued = if let Some(pos) = self.repeats.iter().position(|n| n == name) {
            self.repeats.remove(pos);
            true
        } else if let Some(pos) = self.interrupted.iter().position(|n| n == name) {
            self.interrupted.remove(pos);
            true
        } else {
            false
        };
        queued && self.can_repeat(name)
    }
}
