//! Excel automation for Genie through a COM bridge process.
//!
//! The Windows bridge (`genie-excel-bridge.exe`) owns the `Excel.Application`
//! and executes commands sent as JSON lines over its stdio. On Linux it runs
//! under WINE.
//!
//! ```text
//! Session (genie)
//!     └── ExcelService (this crate)
//!           └── ExcelHost ── ExcelBridge ── spawns: [wine] genie-excel-bridge.exe
//!                                                └── COM: Excel.Application
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use genie_excel::{ExcelBridge, ExcelBridgeConfig, ExcelService, ExcelServiceConfig, WorkbookSource};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = ExcelBridge::spawn(ExcelBridgeConfig::default())?;
//!     let mut excel = ExcelService::new(bridge, ExcelServiceConfig::default());
//!     excel.load_workbook(WorkbookSource::File(Path::new("Budget.xlsx")))?;
//!     excel.execute_vba("Sub Main()\n  Range(\"A1\").Value = 42\nEnd Sub", true)?;
//!     excel.close();
//!     Ok(())
//! }
//! ```

mod bridge;
mod error;
mod events;
mod host;
mod plan;
mod service;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use bridge::{linux_to_wine_path, ExcelBridge, ExcelBridgeConfig};
pub use error::{BridgeError, ExcelError, RestoreOutcome, Result};
pub use events::{Emitter, ExcelEvent};
pub use host::ExcelHost;
pub use plan::{executable_steps, parse_plan_steps, PlanStep};
pub use service::{
    backup_path_for, ExcelService, ExcelServiceConfig, WorkbookSource, NEW_WORKBOOK,
};

pub use genie_protocol as protocol;
