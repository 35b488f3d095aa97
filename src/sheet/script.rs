//! ScriptSheet: ordered cells with a small declarative formula set.
//!
//! Cells are evaluated top to bottom. Formulas are serde-tagged so machine
//! configs can declare them in YAML:
//!
//! ```yaml
//! cells:
//!   - name: A1
//!     value: 1
//!     formula: { fn: add, cell: A1, by: 1 }
//!   - name: A2
//!     formula: { fn: execute, target: S2, repetitions: 3 }
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::execute::ExecuteCall;
use crate::message::Message;
use crate::requests::AwaitMode;
use crate::sheet::{ErrorCode, Sheet, StepContext, Value};

fn one() -> f64 {
    1.0
}

fn one_u32() -> u32 {
    1
}

/// Declarative formula understood by [`ScriptSheet`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fn", rename_all = "snake_case")]
pub enum Formula {
    /// Constant value
    Const { value: serde_json::Value },
    /// `cell + by`
    Add {
        cell: String,
        #[serde(default = "one")]
        by: f64,
    },
    /// Value of another cell
    Ref { cell: String },
    /// `mod(cell, divisor)`
    Mod { cell: String, divisor: f64 },
    /// `return(value?)`
    Return {
        #[serde(default)]
        value: Option<serde_json::Value>,
    },
    /// `if(mod(cell, divisor) = 0, return(value?), false)`
    ReturnWhen {
        cell: String,
        divisor: f64,
        #[serde(default)]
        value: Option<serde_json::Value>,
    },
    /// `pause()`
    Pause,
    /// `sleep(seconds)`
    Sleep { seconds: f64 },
    /// `execute(target, repetitions, message?, speed?)`
    Execute {
        target: String,
        #[serde(default = "one_u32")]
        repetitions: u32,
        #[serde(default)]
        message: Option<serde_json::Value>,
        #[serde(default)]
        speed_ms: Option<u64>,
    },
    /// Start an asynchronous request; the cell holds its id
    Request {
        #[serde(default)]
        label: String,
    },
    /// `await(cells...)` or, with `one`, `await.one(cells...)`
    Await {
        cells: Vec<String>,
        #[serde(default)]
        one: bool,
    },
    /// `loopindices()`
    LoopIndex,
    /// Id of the message being processed
    MessageId,
    /// `messageids()`: comma separated inbox message ids
    MessageIds,
    /// Read from the current message (or loop element) by JSON pointer
    Data {
        #[serde(default)]
        pointer: String,
    },
}

impl Formula {
    /// `cell + by`
    pub fn add(cell: &str, by: f64) -> Self {
        Formula::Add {
            cell: cell.to_string(),
            by,
        }
    }

    /// `execute(target)` with one repetition, cycle paced
    pub fn execute(target: &str) -> Self {
        Formula::Execute {
            target: target.to_string(),
            repetitions: 1,
            message: None,
            speed_ms: None,
        }
    }

    /// `return()` once `mod(cell, divisor) = 0`
    pub fn return_when(cell: &str, divisor: f64) -> Self {
        Formula::ReturnWhen {
            cell: cell.to_string(),
            divisor,
            value: None,
        }
    }
}

/// Host-provided formula. Receives the context, read access to all cells,
/// and its own cell index.
pub type NativeFormula = Arc<dyn Fn(&mut StepContext<'_>, &CellLookup<'_>, usize) -> Value + Send + Sync>;

/// Read-only view of a sheet's cells for native formulas
pub struct CellLookup<'c> {
    cells: &'c [Cell],
}

impl CellLookup<'_> {
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.cells.iter().find(|c| c.name == name).map(|c| &c.value)
    }
}

#[derive(Clone)]
enum CellKind {
    Plain,
    Script(Formula),
    Native(NativeFormula),
}

impl fmt::Debug for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellKind::Plain => f.write_str("Plain"),
            CellKind::Script(formula) => f.debug_tuple("Script").field(formula).finish(),
            CellKind::Native(_) => f.write_str("Native"),
        }
    }
}

#[derive(Debug, Clone)]
struct Cell {
    name: String,
    kind: CellKind,
    value: Value,
}

/// Ordered-cell sheet engine
#[derive(Debug, Clone, Default)]
pub struct ScriptSheet {
    cells: Vec<Cell>,
}

impl ScriptSheet {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell_mut(&mut self, name: &str) -> &mut Cell {
        let pos = match self.cells.iter().position(|c| c.name == name) {
            Some(pos) => pos,
            None => {
                self.cells.push(Cell {
                    name: name.to_string(),
                    kind: CellKind::Plain,
                    value: Value::Empty,
                });
                self.cells.len() - 1
            }
        };
        &mut self.cells[pos]
    }

    /// Set a cell's formula, creating the cell at the end if needed
    pub fn with_cell(mut self, name: &str, formula: Formula) -> Self {
        self.cell_mut(name).kind = CellKind::Script(formula);
        self
    }

    /// Set a cell's value, keeping any formula it has
    pub fn with_value(mut self, name: &str, value: Value) -> Self {
        self.cell_mut(name).value = value;
        self
    }

    /// Set a host closure as the cell's formula
    pub fn with_native<F>(mut self, name: &str, formula: F) -> Self
    where
        F: Fn(&mut StepContext<'_>, &CellLookup<'_>, usize) -> Value + Send + Sync + 'static,
    {
        self.cell_mut(name).kind = CellKind::Native(Arc::new(formula));
        self
    }

    /// Replace or delete (`None`) a cell's formula
    pub fn set_formula(&mut self, name: &str, formula: Option<Formula>) {
        self.cell_mut(name).kind = match formula {
            Some(f) => CellKind::Script(f),
            None => CellKind::Plain,
        };
    }

    /// Position of a cell in evaluation order
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.cells.iter().position(|c| c.name == name)
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.cells.iter().find(|c| c.name == name).map(|c| &c.value)
    }

    fn number(&self, name: &str) -> std::result::Result<f64, Value> {
        match self.lookup(name) {
            None => Err(Value::Error(ErrorCode::Ref)),
            Some(Value::Error(code)) => Err(Value::Error(*code)),
            Some(v) => v.as_number().ok_or(Value::Error(ErrorCode::InvalidParam)),
        }
    }

    fn eval(&self, formula: &Formula, cell: usize, ctx: &mut StepContext<'_>) -> Value {
        match formula {
            Formula::Const { value } => Value::from_json(value),
            Formula::Add { cell: target, by } => match self.number(target) {
                Ok(n) => Value::Number(n + by),
                Err(e) => e,
            },
            Formula::Ref { cell: target } => self
                .lookup(target)
                .cloned()
                .unwrap_or(Value::Error(ErrorCode::Ref)),
            Formula::Mod { cell: target, divisor } => match self.number(target) {
                Ok(_) if *divisor == 0.0 => Value::Error(ErrorCode::InvalidParam),
                Ok(n) => Value::Number(n.rem_euclid(*divisor)),
                Err(e) => e,
            },
            Formula::Return { value } => ctx.return_value(value.as_ref().map(Value::from_json)),
            Formula::ReturnWhen {
                cell: target,
                divisor,
                value,
            } => match self.number(target) {
                Ok(n) if *divisor != 0.0 && n.rem_euclid(*divisor) == 0.0 => {
                    ctx.return_value(value.as_ref().map(Value::from_json))
                }
                Ok(_) => Value::Bool(false),
                Err(e) => e,
            },
            Formula::Pause => ctx.pause(cell),
            Formula::Sleep { seconds } => ctx.sleep(cell, *seconds),
            Formula::Execute {
                target,
                repetitions,
                message,
                speed_ms,
            } => {
                let mut call = ExecuteCall::new(target).with_repetitions(*repetitions);
                if let Some(data) = message {
                    call = call.with_message(Message::new(data.clone()));
                }
                if let Some(speed) = speed_ms {
                    call = call.with_speed(*speed);
                }
                ctx.execute(cell, call)
            }
            Formula::Request { label } => Value::Text(ctx.create_request(label)),
            Formula::Await { cells, one } => {
                let mut ids = Vec::with_capacity(cells.len());
                for name in cells {
                    match self.lookup(name) {
                        Some(Value::Text(id)) => ids.push(id.clone()),
                        Some(_) => return Value::Error(ErrorCode::InvalidParam),
                        None => return Value::Error(ErrorCode::Ref),
                    }
                }
                let mode = if *one { AwaitMode::Any } else { AwaitMode::All };
                ctx.await_requests(cell, ids, mode)
            }
            Formula::LoopIndex => ctx
                .loop_index()
                .map(|i| Value::Number(i as f64))
                .unwrap_or(Value::Empty),
            Formula::MessageId => ctx
                .message()
                .map(|m| Value::Text(m.id().to_string()))
                .unwrap_or(Value::Empty),
            Formula::MessageIds => Value::Text(ctx.message_ids().join(",")),
            Formula::Data { pointer } => {
                let found = match ctx.data() {
                    Some(data) if pointer.is_empty() => Some(data),
                    Some(data) => data.pointer(pointer),
                    None => None,
                };
                found.map(Value::from_json).unwrap_or(Value::Empty)
            }
        }
    }
}

impl Sheet for ScriptSheet {
    fn recalculate(&mut self, from: usize, ctx: &mut StepContext<'_>) -> Result<()> {
        for idx in from..self.cells.len() {
            if ctx.is_stopped() {
                break;
            }
            let value = match &self.cells[idx].kind {
                CellKind::Plain => continue,
                CellKind::Script(formula) => self.eval(formula, idx, ctx),
                CellKind::Native(formula) => (**formula)(ctx, &CellLookup { cells: &self.cells }, idx),
            };
            self.cells[idx].value = value;
        }
        Ok(())
    }

    fn value_at(&self, cell: &str) -> Option<Value> {
        self.lookup(cell).cloned()
    }

    fn set_value_at(&mut self, cell: &str, value: Value) -> Result<()> {
        let idx = self
            .index_of(cell)
            .ok_or_else(|| EngineError::Cell(format!("no cell named {}", cell)))?;
        self.cells[idx].value = value;
        Ok(())
    }

    fn cell_names(&self) -> Vec<String> {
        self.cells.iter().map(|c| c.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::RequestRegistry;
    use crate::sheet::{Halt, SheetEntry};
    use crate::trigger::TriggerKind;
    use serde_json::json;
    use std::collections::HashMap;

    fn recalc(sheet: &mut ScriptSheet, from: usize) -> crate::sheet::StepEffects {
        let dir = vec![SheetEntry {
            name: "S2".into(),
            kind: TriggerKind::Execute,
        }];
        let mut results = HashMap::new();
        let mut reqs = RequestRegistry::new();
        let mut ctx = StepContext::new("S1", &dir, &mut results, &mut reqs);
        sheet.recalculate(from, &mut ctx).unwrap();
        ctx.into_effects()
    }

    #[test]
    fn test_self_increment() {
        let mut sheet = ScriptSheet::new()
            .with_value("A1", Value::Number(1.0))
            .with_cell("A1", Formula::add("A1", 1.0));
        recalc(&mut sheet, 0);
        recalc(&mut sheet, 0);
        assert_eq!(sheet.value_at("A1"), Some(Value::Number(3.0)));
    }

    #[test]
    fn test_return_stops_evaluation() {
        let mut sheet = ScriptSheet::new()
            .with_cell("A1", Formula::Return { value: Some(json!(7)) })
            .with_cell("A2", Formula::add("A2", 1.0));
        let effects = recalc(&mut sheet, 0);
        assert_eq!(effects.returned, Some(Some(Value::Number(7.0))));
        assert_eq!(sheet.value_at("A2"), Some(Value::Empty));
    }

    #[test]
    fn test_return_when_modulo() {
        let mut sheet = ScriptSheet::new()
            .with_cell("B1", Formula::add("B1", 1.0))
            .with_cell("B2", Formula::return_when("B1", 3.0));
        assert!(recalc(&mut sheet, 0).returned.is_none());
        assert!(recalc(&mut sheet, 0).returned.is_none());
        assert_eq!(recalc(&mut sheet, 0).returned, Some(None));
    }

    #[test]
    fn test_pause_halts_and_resumes_after_cell() {
        let mut sheet = ScriptSheet::new()
            .with_cell("A1", Formula::add("A1", 1.0))
            .with_cell("A2", Formula::Pause)
            .with_cell("A3", Formula::add("A3", 1.0));
        let effects = recalc(&mut sheet, 0);
        let halt = effects.halt.unwrap();
        assert_eq!(halt, Halt::Pause { cell: 1 });
        assert_eq!(sheet.value_at("A3"), Some(Value::Empty));

        recalc(&mut sheet, halt.resume_at());
        assert_eq!(sheet.value_at("A1"), Some(Value::Number(1.0)));
        assert_eq!(sheet.value_at("A3"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_execute_cell_shows_waiting() {
        let mut sheet = ScriptSheet::new().with_cell("A1", Formula::execute("S2"));
        let effects = recalc(&mut sheet, 0);
        assert!(matches!(effects.halt, Some(Halt::Execute { cell: 0, .. })));
        assert_eq!(sheet.value_at("A1"), Some(Value::Error(ErrorCode::Waiting)));
    }

    #[test]
    fn test_bad_reference() {
        let mut sheet = ScriptSheet::new().with_cell("A1", Formula::add("Z9", 1.0));
        recalc(&mut sheet, 0);
        assert_eq!(sheet.value_at("A1"), Some(Value::Error(ErrorCode::Ref)));
    }

    #[test]
    fn test_native_formula_reads_cells() {
        let mut sheet = ScriptSheet::new()
            .with_value("A1", Value::Number(20.0))
            .with_native("A2", |_ctx, cells, _idx| {
                let n = cells.value("A1").and_then(|v| v.as_number()).unwrap_or(0.0);
                Value::Number(n * 2.0)
            });
        recalc(&mut sheet, 0);
        assert_eq!(sheet.value_at("A2"), Some(Value::Number(40.0)));
    }

    #[test]
    fn test_formula_yaml_roundtrip() {
        let yaml = "{ fn: execute, target: S2, repetitions: 3, speed_ms: 1 }";
        let formula: Formula = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            formula,
            Formula::Execute {
                target: "S2".into(),
                repetitions: 3,
                message: None,
                speed_ms: Some(1),
            }
        );
        let pause: Formula = serde_yaml::from_str("{ fn: pause }").unwrap();
        assert_eq!(pause, Formula::Pause);
    }

    #[test]
    fn test_set_value_unknown_cell() {
        let mut sheet = ScriptSheet::new();
        assert!(sheet.set_value_at("A1", Value::Bool(true)).is_err());
    }
}
