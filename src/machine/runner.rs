//! Async driver for a [`Machine`].
//!
//! The runner owns the machine on one task and is the only thing touching
//! it. Clients talk to it through a [`MachineHandle`]; commands, cycle ticks
//! and endless repeats are interleaved by a single `select!` loop, so a sheet
//! repeating forever never starves commands or ticks.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::error::{EngineError, Result};
use crate::machine::{Machine, MachineSnapshot, RunState};
use crate::message::Message;

/// Requests accepted by a running [`MachineRunner`]
#[derive(Debug)]
pub enum MachineCommand {
    Start,
    Pause,
    Stop,
    Step,
    Put { sheet: String, message: Message },
    Resolve { request_id: String },
    Snapshot(oneshot::Sender<MachineSnapshot>),
    Shutdown,
}

/// Cloneable client side of a runner
#[derive(Debug, Clone)]
pub struct MachineHandle {
    tx: mpsc::Sender<MachineCommand>,
}

impl MachineHandle {
    async fn send(&self, command: MachineCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| EngineError::RunnerClosed)
    }

    pub async fn start(&self) -> Result<()> {
        self.send(MachineCommand::Start).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(MachineCommand::Pause).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(MachineCommand::Stop).await
    }

    pub async fn step(&self) -> Result<()> {
        self.send(MachineCommand::Step).await
    }

    pub async fn put(&self, sheet: &str, message: Message) -> Result<()> {
        self.send(MachineCommand::Put {
            sheet: sheet.to_string(),
            message,
        })
        .await
    }

    pub async fn resolve(&self, request_id: &str) -> Result<()> {
        self.send(MachineCommand::Resolve {
            request_id: request_id.to_string(),
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<MachineSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(MachineCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| EngineError::RunnerClosed)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(MachineCommand::Shutdown).await
    }
}

pub struct MachineRunner {
    machine: Machine,
    commands: mpsc::Receiver<MachineCommand>,
}

impl MachineRunner {
    pub fn new(machine: Machine) -> (Self, MachineHandle) {
        let (tx, commands) = mpsc::channel(64);
        (Self { machine, commands }, MachineHandle { tx })
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Run until shut down or every handle is dropped. Returns the machine.
    pub async fn run(mut self) -> Result<Machine> {
        self.machine.settings().validate()?;
        let cycletime = Duration::from_millis(self.machine.settings().cycletime_ms);
        let budget = self.machine.settings().turn_budget;
        let mut interval = tokio::time::interval(cycletime);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            machine = %self.machine.name(),
            cycletime_ms = cycletime.as_millis() as u64,
            "Machine runner started"
        );

        loop {
            let running = self.machine.state() == RunState::Running;
            let repeating = running && self.machine.has_repeats();
            tokio::select! {
                biased;
                command = self.commands.recv() => {
                    match command {
                        None | Some(MachineCommand::Shutdown) => break,
                        Some(command) => self.handle(command)?,
                    }
                }
                _ = interval.tick(), if running => {
                    self.machine.tick()?;
                }
                _ = tokio::task::yield_now(), if repeating => {
                    let ran = self.machine.drain_repeats(budget)?;
                    tracing::trace!(machine = %self.machine.name(), ran, "Drained repeats");
                }
            }
        }

        tracing::info!(machine = %self.machine.name(), "Machine runner stopped");
        Ok(self.machine)
    }

    fn handle(&mut self, command: MachineCommand) -> Result<()> {
        tracing::debug!(machine = %self.machine.name(), command = ?command, "Command");
        match command {
            MachineCommand::Start => self.machine.start(),
            MachineCommand::Pause => self.machine.pause(),
            MachineCommand::Stop => self.machine.stop(),
            MachineCommand::Step => self.machine.step(),
            MachineCommand::Put { sheet, message } => {
                if let Err(e) = self.machine.put_message(&sheet, message) {
                    tracing::warn!(sheet = %sheet, error = %e, "Message rejected");
                }
                Ok(())
            }
            MachineCommand::Resolve { request_id } => {
                self.machine.resolve_request(&request_id)?;
                Ok(())
            }
            MachineCommand::Snapshot(reply) => {
                let _ = reply.send(self.machine.snapshot());
                Ok(())
            }
            MachineCommand::Shutdown => Ok(()),
        }
    }
}
