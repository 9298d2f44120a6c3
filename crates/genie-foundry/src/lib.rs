//! Client for the Genie ontology on Palantir Foundry.
//!
//! Covers the calls the desktop workflow makes: creating user prompts,
//! requesting and polling agent plans and plan steps, and mirroring a
//! workbook's worksheets, cells and charts as ontology objects.
//!
//! All HTTP goes through the [`Transport`] trait; [`ReqwestTransport`] is the
//! production implementation.
//!
//! ```rust,no_run
//! use genie_foundry::{CancellationToken, FoundryClient, FoundryConfig, UserPrompt};
//!
//! # async fn run() -> genie_foundry::Result<()> {
//! let config = FoundryConfig {
//!     base_url: "https://example.palantirfoundry.com/api".into(),
//!     ontology_id: "ontology-genie".into(),
//!     ..Default::default()
//! };
//! let mut client = FoundryClient::connect(config, std::env::var("FOUNDRY_TOKEN").unwrap_or_default());
//! let cancel = CancellationToken::new();
//!
//! let key = client.create_user_prompt(&UserPrompt::new("Total column C")).await?;
//! let plan = client.get_agent_plan("workbook-pk", &cancel).await?;
//! let steps = client.get_plan_steps("workbook-pk", &key, &cancel).await?;
//! # let _ = (plan, steps);
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
pub mod params;
mod response;
mod transport;

pub use client::{
    CellUploadStats, EntityReference, FoundryClient, FoundryConfig, CREATE_EXCEL_CELL,
    CREATE_EXCEL_CHART, CREATE_EXCEL_WORKBOOK, CREATE_EXCEL_WORKSHEET, CREATE_USER_PROMPT,
    GENERATE_WORKBOOK_SUMMARY, GET_AGENT_PLAN, PLAN_STEPS_QUERY,
};
pub use error::{FoundryError, Result};
pub use params::UserPrompt;
pub use response::{ActionResponse, Edit};
pub use transport::{HttpResponse, ReqwestTransport, Transport};

pub use tokio_util::sync::CancellationToken;
