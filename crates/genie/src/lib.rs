//! Genie for Excel application core.
//!
//! A [`Session`] owns the Excel connection, the Foundry client and the
//! conversation. Loading a workbook mirrors it to the ontology; each prompt
//! then yields an agent plan whose VBA steps run in the open workbook, with
//! a snapshot pushed on the undo stack first.
//!
//! ```rust,no_run
//! use std::path::Path;
//! use genie::{AppPaths, GenieConfig, Session};
//! use genie_excel::{ExcelBridge, ExcelService, WorkbookSource};
//! use genie_foundry::{CancellationToken, FoundryClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let paths = AppPaths::resolve()?;
//! let config = GenieConfig::load(&paths.config_file)?;
//! let excel = ExcelService::new(
//!     ExcelBridge::spawn(config.bridge_config())?,
//!     config.service_config(),
//! );
//! let foundry = FoundryClient::connect(config.foundry_config()?, config.token()?);
//!
//! let mut session = Session::new(excel, foundry, paths);
//! session.load_workbook(WorkbookSource::File(Path::new("Budget.xlsx"))).await?;
//! let outcome = session
//!     .generate("Total each column in bold", None, &CancellationToken::new())
//!     .await?;
//! println!("{}", outcome.agent_plan);
//! # Ok(())
//! # }
//! ```

pub mod attachments;
mod chat;
mod error;
pub mod logging;
mod recent;
mod session;
mod settings;

pub use attachments::Attachment;
pub use chat::{
    ChatEvent, ChatManager, ConversationTurn, LoadingMessage, UndoAction, LOADING_TEXT,
    NOTHING_TO_UNDO,
};
pub use error::{GenieError, Result};
pub use recent::{RecentFile, RecentFiles, MAX_RECENT_FILES};
pub use session::{
    GenerateOutcome, MirrorReport, Session, UndoOutcome, BACKUP_LOAD_FAILED, BACKUP_NOT_FOUND,
    NO_ACTIVE_WORKBOOK, REVERTED, STEPS_APOLOGY, STEPS_ERROR,
};
pub use settings::{AppPaths, ExcelSection, FoundrySection, GenieConfig, Settings, TOKEN_ENV};
