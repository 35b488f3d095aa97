//! CLI command definitions using clap.
//!
//! - run: step a machine by hand for a number of cycles
//! - watch: drive a machine in real time
//! - check: validate a machine config
//! - triggers: print each sheet's persisted trigger

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Streamsheet - run reactive sheets driven by triggers
#[derive(Parser, Debug)]
#[command(name = "streamsheet")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional machine config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// A message for a sheet's inbox, given as `SHEET=JSON`
#[derive(Debug, Clone, PartialEq)]
pub struct PutArg {
    pub sheet: String,
    pub data: serde_json::Value,
}

fn parse_put(raw: &str) -> Result<PutArg, String> {
    let (sheet, data) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected SHEET=JSON, got '{}'", raw))?;
    if sheet.is_empty() {
        return Err("sheet name must not be empty".to_string());
    }
    let data = serde_json::from_str(data).map_err(|e| format!("invalid JSON for {}: {}", sheet, e))?;
    Ok(PutArg {
        sheet: sheet.to_string(),
        data,
    })
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the machine and step it by hand
    Run {
        /// Number of manual steps
        #[arg(short, long, default_value_t = 1)]
        ticks: u32,

        /// Put a message before stepping (repeatable)
        #[arg(short, long = "put", value_name = "SHEET=JSON", value_parser = parse_put)]
        puts: Vec<PutArg>,

        /// Print the final snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the machine in real time
    Watch {
        /// How long to run before stopping
        #[arg(short, long, default_value_t = 5)]
        seconds: u64,
    },

    /// Validate the machine config
    Check,

    /// Print each StreamSheet's trigger configuration
    Triggers,
}
