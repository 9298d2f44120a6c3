//! Error types for the application core.

use thiserror::Error;

/// Result type for application operations.
pub type Result<T> = std::result::Result<T, GenieError>;

#[derive(Debug, Error)]
pub enum GenieError {
    #[error(transparent)]
    Excel(#[from] genie_excel::ExcelError),

    #[error(transparent)]
    Foundry(#[from] genie_foundry::FoundryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Attachment error: {0}")]
    Attachment(String),

    #[error("No workbook has been mirrored to Foundry; load a workbook first")]
    NoWorkbookMirrored,
}

impl From<toml::de::Error> for GenieError {
    fn from(e: toml::de::Error) -> Self {
        GenieError::Config(e.to_string())
    }
}
