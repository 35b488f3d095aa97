//! Per-StreamSheet configuration

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::sheet::{Formula, ScriptSheet, Value};
use crate::streamsheet::{LoopSettings, StreamSheet};
use crate::trigger::{Trigger, TriggerConfig};

/// One cell of a [`ScriptSheet`]: an initial value, a formula, or both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<Formula>,
}

impl CellConfig {
    pub fn value(name: &str, value: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            value: Some(value),
            formula: None,
        }
    }

    pub fn formula(name: &str, formula: Formula) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            formula: Some(formula),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetConfig {
    pub name: String,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default, rename = "loop")]
    pub loop_settings: LoopSettings,
    /// Overrides the machine-wide inbox capacity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbox_max_size: Option<usize>,
    #[serde(default)]
    pub cells: Vec<CellConfig>,
}

impl SheetConfig {
    pub fn new(name: &str, trigger: TriggerConfig) -> Self {
        Self {
            name: name.to_string(),
            trigger,
            loop_settings: LoopSettings::default(),
            inbox_max_size: None,
            cells: Vec::new(),
        }
    }

    pub fn with_cell(mut self, cell: CellConfig) -> Self {
        self.cells.push(cell);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Config("streamsheet name must not be empty".to_string()));
        }
        self.trigger
            .validate()
            .map_err(|e| EngineError::Config(format!("{}: {}", self.name, e)))?;
        if self.inbox_max_size == Some(0) {
            return Err(EngineError::Config(format!(
                "{}: inbox_max_size must be positive",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for cell in &self.cells {
            if cell.name.trim().is_empty() {
                return Err(EngineError::Config(format!("{}: cell without a name", self.name)));
            }
            if !seen.insert(cell.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "{}: duplicate cell {}",
                    self.name, cell.name
                )));
            }
        }
        Ok(())
    }

    /// Build the StreamSheet. `default_inbox` applies unless this sheet
    /// overrides it.
    pub fn build(&self, default_inbox: Option<usize>) -> Result<StreamSheet> {
        let sheet = self.cells.iter().fold(ScriptSheet::new(), |sheet, cell| {
            let sheet = match &cell.value {
                Some(value) => sheet.with_value(&cell.name, Value::from_json(value)),
                None => sheet.with_value(&cell.name, Value::Empty),
            };
            match &cell.formula {
                Some(formula) => sheet.with_cell(&cell.name, formula.clone()),
                None => sheet,
            }
        });
        let trigger = Trigger::from_config(self.trigger.clone())?;
        let inbox = self.inbox_max_size.or(default_inbox);

        log::debug!(
            "Building streamsheet {} ({} cells, trigger {:?})",
            self.name,
            self.cells.len(),
            self.trigger.kind
        );
        Ok(StreamSheet::new(&self.name, sheet, trigger)?
            .with_loop(self.loop_settings.clone())
            .with_inbox_max_size(inbox))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{IntervalUnit, RepeatMode, TriggerKind};
    use serde_json::json;

    #[test]
    fn test_parse_sheet_yaml() {
        let yaml = r#"
name: S1
trigger: { type: arrival, repeat: endless }
loop: { enabled: true, path: /rows }
inbox_max_size: 5
cells:
  - name: A1
    value: 1
  - name: A2
    formula: { fn: add, cell: A1, by: 2 }
"#;
        let config: SheetConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.trigger.kind, TriggerKind::Arrival);
        assert_eq!(config.trigger.repeat, RepeatMode::Endless);
        assert!(config.loop_settings.enabled);
        assert_eq!(config.loop_settings.path, "/rows");
        assert_eq!(config.inbox_max_size, Some(5));
        assert_eq!(config.cells[0].value, Some(json!(1)));
        assert_eq!(config.cells[1].formula, Some(Formula::add("A1", 2.0)));
    }

    #[test]
    fn test_trigger_defaults_to_continuously() {
        let config: SheetConfig = serde_yaml::from_str("name: S1").unwrap();
        assert_eq!(config.trigger.kind, TriggerKind::Continuously);
        assert!(config.cells.is_empty());
    }

    #[test]
    fn test_validate_rejects_duplicate_cells() {
        let config = SheetConfig::new("S1", TriggerConfig::default())
            .with_cell(CellConfig::value("A1", json!(1)))
            .with_cell(CellConfig::value("A1", json!(2)));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_timer_without_interval() {
        let config = SheetConfig::new("S1", TriggerConfig::new(TriggerKind::Timer));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("S1"));

        let config = SheetConfig::new(
            "S1",
            TriggerConfig::new(TriggerKind::Timer).with_interval(2, IntervalUnit::S),
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_build_sets_values_and_inbox() {
        let mut config = SheetConfig::new("S1", TriggerConfig::new(TriggerKind::Arrival))
            .with_cell(CellConfig::value("A1", json!(7)))
            .with_cell(CellConfig::formula("A2", Formula::add("A1", 1.0)));
        let sheet = config.build(Some(10)).unwrap();
        assert_eq!(sheet.value_at("A1"), Some(Value::Number(7.0)));
        assert_eq!(sheet.value_at("A2"), Some(Value::Empty));
        assert_eq!(sheet.inbox().max_size(), Some(10));
        assert_eq!(sheet.trigger().bound_to(), Some("S1"));

        config.inbox_max_size = Some(3);
        let sheet = config.build(Some(10)).unwrap();
        assert_eq!(sheet.inbox().max_size(), Some(3));
    }
}
