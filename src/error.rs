//! Error types for the streamsheet engine
//!
//! Centralized error handling using thiserror. These are construction and
//! wiring failures; scheduling problems inside a sheet surface as cell
//! values instead (see [`crate::sheet::ErrorCode`]).

use thiserror::Error;

/// All error types that can occur in the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// A trigger was bound to a second StreamSheet
    #[error("Trigger already bound to streamsheet: {0}")]
    TriggerAlreadyBound(String),

    /// Trigger configuration is not usable
    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    /// A StreamSheet with this name is already registered
    #[error("Duplicate streamsheet: {0}")]
    DuplicateStreamSheet(String),

    /// No StreamSheet with this name is registered
    #[error("StreamSheet not found: {0}")]
    StreamSheetNotFound(String),

    /// Message ids must be unique within one inbox
    #[error("Duplicate message id: {0}")]
    DuplicateMessage(String),

    /// processStep was entered while a step was already in flight
    #[error("StreamSheet already processing: {0}")]
    Reentrant(String),

    /// Cell addressing error from the sheet engine
    #[error("Cell error: {0}")]
    Cell(String),

    /// Invalid machine or sheet configuration
    #[error("Config error: {0}")]
    Config(String),

    /// The machine runner task has shut down
    #[error("Machine runner closed")]
    RunnerClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
