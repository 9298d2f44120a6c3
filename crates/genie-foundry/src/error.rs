//! Error types for the Foundry client.

use thiserror::Error;

/// Result type for Foundry operations.
pub type Result<T> = std::result::Result<T, FoundryError>;

#[derive(Debug, Error)]
pub enum FoundryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to {action}. Status: {status}. Content: {body}")]
    Status {
        action: String,
        status: u16,
        body: String,
    },

    #[error("Could not extract primary key from {action} response: {body}")]
    MissingPrimaryKey { action: String, body: String },

    #[error("Validation failed for {action}: {body}")]
    ValidationFailed { action: String, body: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl FoundryError {
    /// Whether a plan-steps query failed because the backend ran out of time
    /// and the same query may succeed when retried.
    pub fn is_query_timeout(&self) -> bool {
        match self {
            FoundryError::Status { body, .. } => {
                body.contains("TIMEOUT") || body.contains("QueryTimeExceededLimit")
            }
            _ => false,
        }
    }
}
