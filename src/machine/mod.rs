//! Machine: owns the StreamSheets and schedules their steps.
//!
//! The machine is single threaded and deterministic. Each cycle visits the
//! StreamSheets in registration order; work a step causes (resuming a
//! caller, the next turn of an `execute()` frame) goes onto an internal
//! queue that is drained before the next sheet is visited. Endless repeats
//! wait on a separate queue so the async [`MachineRunner`] can interleave
//! them with commands and ticks.

mod chain;
mod dispatch;
mod events;
mod runner;
mod snapshot;
mod state;

pub use events::MachineEvent;
pub use runner::{MachineCommand, MachineHandle, MachineRunner};
pub use snapshot::{CellSnapshot, MachineSnapshot, SheetSnapshot};
pub use state::{MachineSettings, RunState};

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::clock::{Clock, SystemClock};
use crate::error::{EngineError, Result};
use crate::execute::ExecuteBridge;
use crate::id::generate_machine_id;
use crate::message::{Message, Outbox};
use crate::requests::RequestRegistry;
use crate::sheet::{ErrorCode, SheetEntry};
use crate::streamsheet::StreamSheet;
use crate::trigger::{AdmissionEvent, TriggerConfig};

/// Deferred machine work
#[derive(Debug, Clone, PartialEq, Eq)]
enum Work {
    /// Continue a halted recalculation
    Resume(String),
    /// Run the pending step of the execute frame driving this callee
    ExecuteTurn(String),
}

impl Work {
    fn sheet(&self) -> &str {
        match self {
            Work::Resume(name) | Work::ExecuteTurn(name) => name,
        }
    }
}

pub struct Machine {
    id: String,
    name: String,
    settings: MachineSettings,
    state: RunState,
    sheets: Vec<StreamSheet>,
    outbox: Outbox,
    requests: RequestRegistry,
    bridge: ExecuteBridge,
    work: VecDeque<Work>,
    repeats: VecDeque<String>,
    interrupted: Vec<String>,
    clock: Arc<dyn Clock>,
    steps: u64,
    cycle: u64,
    subscribers: Vec<mpsc::UnboundedSender<MachineEvent>>,
}

impl Machine {
    pub fn new(name: &str, settings: MachineSettings) -> Self {
        Self {
            id: generate_machine_id(),
            name: name.to_string(),
            settings,
            state: RunState::Stopped,
            sheets: Vec::new(),
            outbox: Outbox::new(),
            requests: RequestRegistry::new(),
            bridge: ExecuteBridge::new(),
            work: VecDeque::new(),
            repeats: VecDeque::new(),
            interrupted: Vec::new(),
            clock: Arc::new(SystemClock),
            steps: 0,
            cycle: 0,
            subscribers: Vec::new(),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &MachineSettings {
        &self.settings
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Cycles since the last start from stopped
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }

    pub fn bridge(&self) -> &ExecuteBridge {
        &self.bridge
    }

    /// Subscribe to machine events. Dropped receivers are pruned on the next
    /// event.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<MachineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: MachineEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    // --- registry ---

    pub fn streamsheets(&self) -> &[StreamSheet] {
        &self.sheets
    }

    pub fn streamsheet(&self, name: &str) -> Option<&StreamSheet> {
        self.sheets.iter().find(|s| s.name() == name)
    }

    pub fn streamsheet_mut(&mut self, name: &str) -> Option<&mut StreamSheet> {
        self.sheets.iter_mut().find(|s| s.name() == name)
    }

    fn require_mut(&mut self, name: &str) -> Result<&mut StreamSheet> {
        self.streamsheet_mut(name)
            .ok_or_else(|| EngineError::StreamSheetNotFound(name.to_string()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name() == name)
    }

    /// Names and trigger types visible to `execute()`
    pub fn directory(&self) -> Vec<SheetEntry> {
        self.sheets
            .iter()
            .map(|s| SheetEntry {
                name: s.name().to_string(),
                kind: s.trigger().kind(),
            })
            .collect()
    }

    /// Register a StreamSheet. Names are unique within a machine.
    pub fn add_streamsheet(&mut self, mut sheet: StreamSheet) -> Result<()> {
        if self.position(sheet.name()).is_some() {
            return Err(EngineError::DuplicateStreamSheet(sheet.name().to_string()));
        }
        if self.state == RunState::Running {
            sheet.trigger_mut().arm(self.clock.now_ms());
        }
        log::info!("Machine {}: added streamsheet {}", self.name, sheet.name());
        self.sheets.push(sheet);
        Ok(())
    }

    /// Remove and dispose a StreamSheet. Callers waiting on it get
    /// `#NO_STREAMSHEET`.
    pub fn remove_streamsheet(&mut self, name: &str) -> Result<()> {
        let pos = self
            .position(name)
            .ok_or_else(|| EngineError::StreamSheetNotFound(name.to_string()))?;
        let sheet = self.sheets.remove(pos);
        sheet.dispose();
        self.forget(name);
        self.cancel_execute_involving(name, ErrorCode::NoStreamSheet)?;
        log::info!("Machine {}: removed streamsheet {}", self.name, name);
        self.drain_work()
    }

    /// Drop every queued reference to `name`
    fn forget(&mut self, name: &str) {
        self.repeats.retain(|n| n != name);
        self.interrupted.retain(|n| n != name);
        self.work.retain(|w| w.sheet() != name);
    }

    /// Install a new trigger configuration on a StreamSheet.
    ///
    /// An equivalent configuration keeps the running state. A different type
    /// or repeat mode resets the sheet; an `execute()` driving it fails with
    /// `#VALUE!`.
    pub fn set_trigger(&mut self, name: &str, config: TriggerConfig) -> Result<()> {
        let now = self.clock.now_ms();
        let running = self.state == RunState::Running;
        let sheet = self.require_mut(name)?;
        let kept = sheet.replace_trigger(config)?;
        if running {
            sheet.trigger_mut().arm(now);
        }
        if !kept {
            self.forget(name);
            self.cancel_execute_involving(name, ErrorCode::InvalidParam)?;
            self.drain_work()?;
        }
        Ok(())
    }

    // --- messages and requests ---

    /// Put a message into a StreamSheet's inbox. While running, an arrival
    /// trigger processes it immediately.
    pub fn put_message(&mut self, name: &str, message: Message) -> Result<()> {
        let running = self.state == RunState::Running;
        let sheet = self.require_mut(name)?;
        sheet.inbox_mut().put(message)?;
        let admitted = running
            && sheet
                .trigger()
                .admits(AdmissionEvent::MessageArrived, sheet.inbox().has_unprocessed());
        if admitted && !self.bridge.is_busy(name) {
            self.admit(name)?;
        }
        Ok(())
    }

    /// Register an asynchronous request on behalf of an ingestion adapter
    pub fn create_request(&mut self, label: &str) -> String {
        self.requests.create(label)
    }

    /// Resolve a request and wake the StreamSheets awaiting it. Returns
    /// false for unknown ids.
    pub fn resolve_request(&mut self, id: &str) -> Result<bool> {
        if !self.requests.resolve(id) {
            log::warn!("Machine {}: unknown request {}", self.name, id);
            return Ok(false);
        }
        self.wake_ready()?;
        Ok(true)
    }

    pub fn requests(&self) -> &RequestRegistry {
        &self.requests
    }

    // --- per-sheet control ---

    /// Suspend a StreamSheet until [`resume_streamsheet`](Self::resume_streamsheet)
    pub fn pause_streamsheet(&mut self, name: &str) -> Result<()> {
        self.require_mut(name)?.pause_processing();
        self.repeats.retain(|n| n != name);
        Ok(())
    }

    /// Lift a suspension and continue a halted step right away
    pub fn resume_streamsheet(&mut self, name: &str) -> Result<()> {
        if self.require_mut(name)?.resume_processing() {
            self.work.push_back(Work::Resume(name.to_string()));
            self.drain_work()?;
        }
        Ok(())
    }

    /// Queue another step without admission
    pub fn repeat_streamsheet(&mut self, name: &str) -> Result<()> {
        if self.require_mut(name)?.repeat_processing() && !self.repeats.iter().any(|n| n == name) {
            self.repeats.push_back(name.to_string());
        }
        Ok(())
    }

    /// Continue processing at cell `index` right away
    pub fn continue_streamsheet_at(&mut self, name: &str, index: usize) -> Result<()> {
        self.require_mut(name)?.continue_processing_at(index);
        self.work.push_back(Work::Resume(name.to_string()));
        self.drain_work()
    }

    /// Abandon whatever the StreamSheet is doing and return it to idle
    pub fn stop_streamsheet(&mut self, name: &str) -> Result<()> {
        self.require_mut(name)?.stop_processing();
        self.forget(name);
        self.cancel_execute_involving(name, ErrorCode::InvalidParam)?;
        self.drain_work()
    }

    // --- lifecycle ---

    /// Start, or continue after [`pause`](Self::pause).
    ///
    /// From stopped, timers are armed and machine-start triggers fire. From
    /// paused, endless repeats interrupted by the pause are re-queued.
    pub fn start(&mut self) -> Result<()> {
        let previous = self.state;
        if previous == RunState::Running {
            return Ok(());
        }
        self.state = RunState::Running;
        let now = self.clock.now_ms();
        for sheet in &mut self.sheets {
            sheet.trigger_mut().arm(now);
        }
        log::info!("Machine {} started", self.name);
        self.emit(MachineEvent::Started);

        match previous {
            RunState::Paused => {
                let interrupted: Vec<String> = self.interrupted.drain(..).collect();
                for name in interrupted {
                    if self.streamsheet(&name).is_some() && !self.repeats.contains(&name) {
                        self.repeats.push_back(name);
                    }
                }
                Ok(())
            }
            _ => self.fire_event(AdmissionEvent::MachineStart),
        }
    }

    /// Pause ticking. Endless repeats are remembered for [`start`](Self::start);
    /// active `execute()` calls are cancelled and their callers abandoned.
    pub fn pause(&mut self) -> Result<()> {
        if self.state != RunState::Running {
            return Ok(());
        }
        self.state = RunState::Paused;
        self.interrupted.extend(self.repeats.drain(..));
        self.cancel_frames();
        self.work.clear();
        log::info!("Machine {} paused", self.name);
        self.emit(MachineEvent::Paused);
        Ok(())
    }

    /// Stop: every StreamSheet returns to idle, step counters and timers are
    /// reset, then machine-stop triggers fire once.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == RunState::Stopped {
            return Ok(());
        }
        self.state = RunState::Stopped;
        self.work.clear();
        self.repeats.clear();
        self.interrupted.clear();
        self.cancel_frames();
        for sheet in &mut self.sheets {
            sheet.stop_processing();
            sheet.stats_mut().reset();
            sheet.trigger_mut().disarm();
        }
        self.steps = 0;
        log::info!("Machine {} stopped", self.name);

        self.fire_event(AdmissionEvent::MachineStop)?;
        let repeating: Vec<String> = self.repeats.drain(..).collect();
        for name in repeating {
            if let Some(sheet) = self.streamsheet_mut(&name) {
                sheet.stop_processing();
            }
        }
        self.emit(MachineEvent::Stopped);
        Ok(())
    }

    /// Run one cycle by hand, in any state
    pub fn step(&mut self) -> Result<()> {
        self.run_cycle(AdmissionEvent::ManualStep)
    }

    /// Run one timed cycle; does nothing unless running
    pub fn tick(&mut self) -> Result<()> {
        if self.state != RunState::Running {
            return Ok(());
        }
        self.advance_timers()?;
        self.run_cycle(AdmissionEvent::Tick)
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            state: self.state,
            steps: self.steps,
            pending_requests: self.requests.pending_count(),
            active_executes: self.bridge.frames().len(),
            outbox: self.outbox.size(),
            sheets: self.sheets.iter().map(SheetSnapshot::of).collect(),
        }
    }
}
