//! Streamsheet - a trigger-driven scheduling engine for reactive sheets
//!
//! A [`machine::Machine`] owns a set of StreamSheets. Each StreamSheet pairs a
//! sheet of live formulas with an inbox and a trigger that decides when the
//! sheet recalculates. Sheets can chain each other through `execute()` and
//! suspend themselves with `pause()`, `sleep()` and `await()`.

pub mod clock;
pub mod config;
pub mod error;
pub mod execute;
pub mod id;
pub mod machine;
pub mod message;
pub mod requests;
pub mod sheet;
pub mod streamsheet;
pub mod trigger;

pub use error::{EngineError, Result};
