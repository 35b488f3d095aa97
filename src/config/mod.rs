//! Machine configuration.
//!
//! A machine file declares the scheduling settings and its StreamSheets:
//!
//! ```yaml
//! name: demo
//! cycletime_ms: 100
//! sheets:
//!   - name: S1
//!     trigger: { type: continuously }
//!     cells:
//!       - { name: A1, value: 0, formula: { fn: add, cell: A1 } }
//! ```
//!
//! Search order for [`MachineConfig::load`]:
//! 1. Explicit path if provided
//! 2. .streamsheet.yml in current directory (project config)
//! 3. ~/.config/streamsheet/machine.yml (user config)
//! 4. Default values

mod sheet;

pub use sheet::{CellConfig, SheetConfig};

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::{EngineError, Result};
use crate::machine::{Machine, MachineSettings};

/// Project config file name, looked up in the working directory
pub const PROJECT_CONFIG: &str = ".streamsheet.yml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub name: String,
    #[serde(flatten)]
    pub settings: MachineSettings,
    pub sheets: Vec<SheetConfig>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            name: "machine".to_string(),
            settings: MachineSettings::default(),
            sheets: Vec::new(),
        }
    }
}

impl MachineConfig {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let project_config = PathBuf::from(PROJECT_CONFIG);
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", project_config.display(), e);
                }
            }
        }

        if let Some(user_config) = user_config_path() {
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config = Self::from_yaml(&content)?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetConfig> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Config("machine name must not be empty".to_string()));
        }
        self.settings.validate()?;

        let mut names = HashSet::new();
        for sheet in &self.sheets {
            sheet.validate()?;
            if !names.insert(sheet.name.as_str()) {
                return Err(EngineError::Config(format!("duplicate streamsheet {}", sheet.name)));
            }
        }
        Ok(())
    }

    /// Validate and build a stopped machine on the system clock
    pub fn build(&self) -> Result<Machine> {
        self.build_with_clock(Arc::new(SystemClock))
    }

    pub fn build_with_clock(&self, clock: Arc<dyn Clock>) -> Result<Machine> {
        self.validate()?;
        let mut machine = Machine::new(&self.name, self.settings.clone()).with_clock(clock);
        for sheet in &self.sheets {
            machine.add_streamsheet(sheet.build(self.settings.inbox_max_size)?)?;
        }
        log::info!(
            "Built machine {} with {} streamsheets",
            self.name,
            self.sheets.len()
        );
        Ok(machine)
    }
}

/// `~/.config/streamsheet/machine.yml`
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(env!("CARGO_PKG_NAME")).join("machine.yml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sheet::{Formula, Value};
    use crate::trigger::{TriggerConfig, TriggerKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const COUNTER: &str = r#"
name: counter
cycletime_ms: 20
inbox_max_size: 4
sheets:
  - name: S1
    trigger: { type: continuously }
    cells:
      - { name: A1, value: 0, formula: { fn: add, cell: A1 } }
  - name: S2
    trigger: { type: arrival }
    inbox_max_size: 2
"#;

    #[test]
    fn test_default_config() {
        let config = MachineConfig::default();
        assert_eq!(config.name, "machine");
        assert_eq!(config.settings.cycletime_ms, 50);
        assert!(config.sheets.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_flattened_settings() {
        let config = MachineConfig::from_yaml(COUNTER).unwrap();
        assert_eq!(config.name, "counter");
        assert_eq!(config.settings.cycletime_ms, 20);
        assert_eq!(config.settings.inbox_max_size, Some(4));
        assert_eq!(config.settings.max_chain_depth, 16);
        assert_eq!(config.sheets.len(), 2);
        assert_eq!(config.sheet("S2").unwrap().trigger.kind, TriggerKind::Arrival);
    }

    #[test]
    fn test_unbounded_inbox() {
        let config = MachineConfig::from_yaml("inbox_max_size: null").unwrap();
        assert_eq!(config.settings.inbox_max_size, None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(COUNTER.as_bytes()).unwrap();

        let config = MachineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.name, "counter");
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yml");
        let err = MachineConfig::load(Some(missing.as_path())).unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = MachineConfig::from_yaml("sheets: [").unwrap_err();
        assert!(matches!(err, EngineError::Yaml(_)));
    }

    #[test]
    fn test_validate_rejects_duplicate_sheets() {
        let mut config = MachineConfig::default();
        config.sheets.push(SheetConfig::new("S1", TriggerConfig::default()));
        config.sheets.push(SheetConfig::new("S1", TriggerConfig::default()));
        assert!(config.validate().is_err());
        assert!(config.build().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_turn_budget() {
        let mut config = MachineConfig::default();
        config.settings.turn_budget = 0;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_build_and_step() {
        let config = MachineConfig::from_yaml(COUNTER).unwrap();
        let mut machine = config.build_with_clock(Arc::new(ManualClock::new(0))).unwrap();
        assert_eq!(machine.name(), "counter");
        assert_eq!(machine.streamsheets().len(), 2);
        assert_eq!(machine.streamsheet("S1").unwrap().inbox().max_size(), Some(4));
        assert_eq!(machine.streamsheet("S2").unwrap().inbox().max_size(), Some(2));

        machine.step().unwrap();
        machine.step().unwrap();
        assert_eq!(
            machine.streamsheet("S1").unwrap().value_at("A1"),
            Some(Value::Number(2.0))
        );
    }

    #[test]
    fn test_yaml_roundtrip_keeps_formulas() {
        let config = MachineConfig::from_yaml(COUNTER).unwrap();
        let yaml = config.to_yaml().unwrap();
        let again = MachineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(again, config);
        assert_eq!(
            again.sheet("S1").unwrap().cells[0].formula,
            Some(Formula::add("A1", 1.0))
        );
    }
}
