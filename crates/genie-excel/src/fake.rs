//! In-memory [`ExcelHost`] for tests.
//!
//! Enabled for this crate's own tests and for dependents through the
//! `test-util` feature.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::path::Path;

use genie_protocol::{
    AppInfo, CellArea, ChartSnapshot, Command, OpenedWorkbook, ResponseData, WorkbookInfo,
    WorksheetSnapshot,
};

use crate::error::BridgeError;
use crate::host::ExcelHost;

/// Code containing this marker fails when run, like a VBA run-time error.
pub const FAILING_VBA_MARKER: &str = "Err.Raise";

#[derive(Debug)]
pub struct FakeState {
    /// Every command received, in order.
    pub commands: Vec<Command>,
    pub fail_init: bool,
    pub vba_accessible: bool,
    pub sheets: Vec<String>,
    pub active_sheet: Option<String>,
    pub selection: String,
    /// Path (or name, for a new workbook) of the open workbook.
    pub open: Option<String>,
    pub modules: BTreeMap<String, String>,
    /// Number of successful saves of the open workbook.
    pub saves: usize,
    /// Code of every macro that ran successfully, in order.
    pub ran: Vec<String>,
    pub cells: Vec<CellArea>,
    pub charts: Vec<ChartSnapshot>,
    pub text: String,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            fail_init: false,
            vba_accessible: true,
            sheets: vec!["Sheet1".to_string()],
            active_sheet: None,
            selection: "$A$1".to_string(),
            open: None,
            modules: BTreeMap::new(),
            saves: 0,
            ran: Vec::new(),
            cells: Vec::new(),
            charts: Vec::new(),
            text: String::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeExcel {
    state: RefCell<FakeState>,
}

impl FakeExcel {
    pub fn new(state: FakeState) -> Self {
        Self {
            state: RefCell::new(state),
        }
    }

    pub fn state(&self) -> Ref<'_, FakeState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, FakeState> {
        self.state.borrow_mut()
    }
}

fn remote(message: &str) -> BridgeError {
    BridgeError::Remote(message.to_string())
}

impl FakeState {
    fn require_open(&self) -> Result<&str, BridgeError> {
        self.open.as_deref().ok_or_else(|| remote("No workbook is open"))
    }

    fn require_sheet(&self, name: &str) -> Result<usize, BridgeError> {
        self.sheets
            .iter()
            .position(|s| s == name)
            .ok_or_else(|| remote(&format!("Worksheet '{name}' not found")))
    }

    fn handle(&mut self, command: Command) -> Result<Option<ResponseData>, BridgeError> {
        let data = match command {
            Command::Init if self.fail_init => return Err(remote("Excel is not installed")),
            Command::Init
            | Command::SetUserFacing { .. }
            | Command::Shutdown => None,
            Command::CreateWorkbook => {
                self.open = Some("Book1".to_string());
                Some(ResponseData::Opened {
                    opened: OpenedWorkbook {
                        name: "Book1".to_string(),
                        path: None,
                    },
                })
            }
            Command::OpenWorkbook { path } => {
                if path.contains("corrupt") {
                    return Err(remote("Excel cannot open the file"));
                }
                let name = Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.open = Some(path.clone());
                Some(ResponseData::Opened {
                    opened: OpenedWorkbook {
                        name,
                        path: Some(path),
                    },
                })
            }
            Command::CloseWorkbook { .. } => {
                self.open = None;
                None
            }
            Command::WorksheetNames => {
                self.require_open()?;
                Some(ResponseData::Names {
                    names: self.sheets.clone(),
                })
            }
            Command::ActivateWorksheet { name } => {
                self.require_sheet(&name)?;
                self.active_sheet = Some(name);
                None
            }
            Command::ActiveWorksheet => {
                self.require_open()?;
                let sheet = self
                    .active_sheet
                    .clone()
                    .or_else(|| self.sheets.first().cloned())
                    .unwrap_or_default();
                Some(ResponseData::Sheet { sheet })
            }
            Command::Selection => Some(ResponseData::Address {
                address: self.selection.clone(),
            }),
            Command::ChartNames { sheet } => {
                self.require_sheet(&sheet)?;
                Some(ResponseData::Names {
                    names: self.charts.iter().map(|c| c.name.clone()).collect(),
                })
            }
            Command::VbaProjectAccessible => Some(ResponseData::Flag {
                flag: self.vba_accessible,
            }),
            Command::AddModule { name, code } => {
                self.modules.insert(name, code);
                None
            }
            Command::RunMacro { name } => {
                let module = name.trim_end_matches(".Main");
                let code = self
                    .modules
                    .get(module)
                    .cloned()
                    .ok_or_else(|| remote(&format!("Cannot run the macro '{name}'")))?;
                if code.contains(FAILING_VBA_MARKER) {
                    return Err(remote("Run-time error '1004'"));
                }
                self.ran.push(code);
                None
            }
            Command::RemoveModule { name } => {
                self.modules
                    .remove(&name)
                    .ok_or_else(|| remote(&format!("Module '{name}' not found")))?;
                None
            }
            Command::SaveWorkbook { path } => {
                self.require_open()?;
                if let Some(path) = path {
                    std::fs::write(&path, b"saved workbook").map_err(|e| remote(&e.to_string()))?;
                    self.open = Some(path);
                }
                self.saves += 1;
                None
            }
            Command::SaveCopyAs { path } => {
                self.require_open()?;
                std::fs::write(&path, b"workbook copy").map_err(|e| remote(&e.to_string()))?;
                None
            }
            Command::WorkbookInfo => {
                let name = self.require_open()?.to_string();
                Some(ResponseData::Workbook {
                    workbook: WorkbookInfo {
                        full_name: name.clone(),
                        name,
                        author: "Test Author".to_string(),
                        active_sheet: self.sheets.first().cloned().unwrap_or_default(),
                        ..Default::default()
                    },
                })
            }
            Command::ApplicationInfo => Some(ResponseData::Application {
                application: AppInfo {
                    version: "16.0".to_string(),
                    user_name: "Tester".to_string(),
                },
            }),
            Command::WorksheetInfo { sheet } => {
                let index = self.require_sheet(&sheet)?;
                Some(ResponseData::Worksheet {
                    worksheet: WorksheetSnapshot {
                        name: sheet,
                        index: index as i32 + 1,
                        ..Default::default()
                    },
                })
            }
            Command::WorksheetCells { sheet } => {
                self.require_sheet(&sheet)?;
                Some(ResponseData::Cells {
                    areas: self.cells.clone(),
                })
            }
            Command::WorksheetCharts { sheet } => {
                self.require_sheet(&sheet)?;
                Some(ResponseData::Charts {
                    charts: self.charts.clone(),
                })
            }
            Command::WorksheetText { sheet } => {
                self.require_sheet(&sheet)?;
                Some(ResponseData::Text {
                    text: self.text.clone(),
                })
            }
        };
        Ok(data)
    }
}

impl ExcelHost for FakeExcel {
    fn send(&self, command: Command) -> Result<Option<ResponseData>, BridgeError> {
        let mut state = self.state.borrow_mut();
        state.commands.push(command.clone());
        state.handle(command)
    }
}
