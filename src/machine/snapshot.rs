//! Serializable view of a machine for the CLI and runner clients

use serde::Serialize;

use crate::machine::RunState;
use crate::streamsheet::{StreamSheet, StreamSheetStats};
use crate::trigger::{TriggerConfig, TriggerState};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellSnapshot {
    pub name: String,
    pub value: serde_json::Value,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetSnapshot {
    pub name: String,
    pub trigger: TriggerConfig,
    pub state: TriggerState,
    pub stats: StreamSheetStats,
    pub inbox: usize,
    pub suspension: String,
    pub cells: Vec<CellSnapshot>,
}

impl SheetSnapshot {
    pub fn of(sheet: &StreamSheet) -> Self {
        let cells = sheet
            .sheet()
            .cell_names()
            .into_iter()
            .filter_map(|name| {
                let value = sheet.value_at(&name)?;
                Some(CellSnapshot {
                    display: value.to_string(),
                    value: value.to_json(),
                    name,
                })
            })
            .collect();
        Self {
            name: sheet.name().to_string(),
            trigger: sheet.trigger().config().clone(),
            state: sheet.trigger().state(),
            stats: sheet.stats(),
            inbox: sheet.inbox().size(),
            suspension: sheet.suspension().reason().to_string(),
            cells,
        }
    }

    /// Value of a cell by name
    pub fn cell(&self, name: &str) -> Option<&CellSnapshot> {
        self.cells.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineSnapshot {
    pub id: String,
    pub name: String,
    pub state: RunState,
    pub steps: u64,
    pub pending_requests: usize,
    pub active_executes: usize,
    pub outbox: usize,
    pub sheets: Vec<SheetSnapshot>,
}

impl MachineSnapshot {
    pub fn sheet(&self, name: &str) -> Option<&SheetSnapshot> {
        self.sheets.iter().find(|s| s.name == name)
    }
}
