//! Error types for Excel automation.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for Excel operations.
pub type Result<T> = std::result::Result<T, ExcelError>;

/// Errors from the bridge process and its JSON IPC.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to spawn bridge process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Bridge process not running")]
    NotRunning,

    #[error("Failed to send command to bridge: {0}")]
    SendFailed(String),

    #[error("Failed to read response from bridge: {0}")]
    ReadFailed(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Bridge returned error: {0}")]
    Remote(String),

    #[error("Unexpected response data for {0}")]
    UnexpectedResponse(&'static str),

    #[error("WINE not found. Install WINE and ensure 'wine' is in PATH.")]
    WineNotFound,

    #[error("Bridge executable not found at: {0}")]
    BridgeExeNotFound(String),
}

/// What happened when a failed plan tried to roll back to its backup.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// The backup was reopened and is now the open workbook.
    Restored(PathBuf),
    /// Reopening the backup failed.
    Failed(String),
    /// No backup existed to restore from.
    NoBackup,
}

impl fmt::Display for RestoreOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreOutcome::Restored(path) => write!(f, "restored from {}", path.display()),
            RestoreOutcome::Failed(msg) => write!(f, "restore failed: {msg}"),
            RestoreOutcome::NoBackup => write!(f, "no backup to restore"),
        }
    }
}

/// Errors from [`crate::ExcelService`].
#[derive(Debug, Error)]
pub enum ExcelError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("No active workbook")]
    NoWorkbook,

    #[error("The workbook has never been saved, so it cannot be backed up")]
    UnsavedWorkbook,

    #[error("The workbook has no file yet; save it under a name first")]
    NoFilePath,

    #[error("Worksheet '{0}' not found")]
    WorksheetNotFound(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error(
        "VBA Project is not accessible. Make sure the workbook is open and \
         'Trust access to the VBA project object model' is enabled."
    )]
    VbaProjectInaccessible,

    #[error("Step {index} ({title}) failed: {source}")]
    StepFailed {
        index: i64,
        title: String,
        #[source]
        source: Box<ExcelError>,
    },

    #[error("Plan execution failed ({restore}): {source}")]
    PlanFailed {
        #[source]
        source: Box<ExcelError>,
        restore: RestoreOutcome,
    },

    #[error("No valid plan steps found to execute")]
    NoPlanSteps,

    #[error("Invalid plan steps: {0}")]
    InvalidPlanSteps(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
