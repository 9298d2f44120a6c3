//! Shared protocol types for communication between the Genie client and the
//! Windows bridge process that owns the Excel COM objects.
//!
//! The protocol is JSON-over-stdio: one JSON object per line in each direction.
//! The bridge holds at most one `Excel.Application` and one open workbook, so
//! commands never carry workbook handles.

use serde::{Deserialize, Serialize};

pub mod snapshot;
pub mod xl;

pub use snapshot::{
    AppInfo, AreaFormat, AxisFormat, BorderSnapshot, BordersSnapshot, CellArea, CellSnapshot,
    ChartSnapshot, ChartStyle, FontSnapshot, InteriorSnapshot, LegendFormat, LineFormat,
    OpenedWorkbook, PageSetupSnapshot, ThreeDFormat, TitleFormat, WorkbookInfo,
    WorksheetSnapshot, DEFAULT_FILL_COLOR,
};

/// A command sent from the client to the bridge process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Monotonically increasing request ID for correlating responses.
    pub id: u64,
    /// The command to execute.
    #[serde(flatten)]
    pub command: Command,
}

/// Commands the client can send to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum Command {
    /// Initialize COM and create the Excel.Application instance with
    /// visibility, alerts, screen updating, interactivity and events off.
    Init,

    /// Add a blank workbook and make it the open workbook.
    CreateWorkbook,

    /// Open an existing workbook from a (Windows) file path.
    OpenWorkbook { path: String },

    /// Close the open workbook.
    CloseWorkbook { save: bool },

    /// Toggle the user-facing application state (visible, alerts, screen
    /// updating, interactive, events).
    SetUserFacing { enabled: bool },

    /// Names of all worksheets in the open workbook, in tab order.
    WorksheetNames,

    /// Activate a worksheet by name.
    ActivateWorksheet { name: String },

    /// Name of the active worksheet.
    ActiveWorksheet,

    /// Address of the current selection.
    Selection,

    /// Names of the embedded charts in a worksheet.
    ChartNames { sheet: String },

    /// Whether the workbook's VBProject is reachable (trust center setting).
    VbaProjectAccessible,

    /// Add a standard VBA module with the given name and source.
    AddModule { name: String, code: String },

    /// Run a macro by its qualified name (e.g. `GenieModule_x.Main`).
    RunMacro { name: String },

    /// Remove a previously added VBA module.
    RemoveModule { name: String },

    /// Save the open workbook in place, or under `path`, which then becomes
    /// its file.
    SaveWorkbook { path: Option<String> },

    /// Save a copy of the open workbook without changing its path.
    SaveCopyAs { path: String },

    /// Workbook-level properties used when mirroring.
    WorkbookInfo,

    /// Application-level properties (version, user name).
    ApplicationInfo,

    /// Worksheet-level properties used when mirroring.
    WorksheetInfo { sheet: String },

    /// Formatting snapshots of the non-empty cells of a worksheet.
    WorksheetCells { sheet: String },

    /// Formatting snapshots of the embedded charts of a worksheet.
    WorksheetCharts { sheet: String },

    /// Used-range values as tab-separated text.
    WorksheetText { sheet: String },

    /// Shut down the bridge: close the workbook, quit Excel, uninitialize COM.
    Shutdown,
}

/// A response sent from the bridge back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The request ID this response corresponds to.
    pub id: u64,
    /// The result of the command.
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ResponseResult {
    #[serde(rename = "ok")]
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ResponseResult {
    pub fn ok(data: ResponseData) -> Self {
        ResponseResult::Ok { data: Some(data) }
    }

    pub fn empty() -> Self {
        ResponseResult::Ok { data: None }
    }
}

/// Data returned in successful responses. Every variant has a distinct key so
/// untagged decoding is unambiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    Opened { opened: OpenedWorkbook },
    Names { names: Vec<String> },
    Sheet { sheet: String },
    Address { address: String },
    Flag { flag: bool },
    Workbook { workbook: WorkbookInfo },
    Application { application: AppInfo },
    Worksheet { worksheet: WorksheetSnapshot },
    Cells { areas: Vec<CellArea> },
    Charts { charts: Vec<ChartSnapshot> },
    Text { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_wire_shape() {
        let req = Request {
            id: 7,
            command: Command::AddModule {
                name: "GenieModule_1".into(),
                code: "Sub Main()\nEnd Sub".into(),
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["cmd"], "AddModule");
        assert_eq!(json["params"]["name"], "GenieModule_1");

        let unit = serde_json::to_string(&Request { id: 1, command: Command::Init }).unwrap();
        assert_eq!(unit, r#"{"id":1,"cmd":"Init"}"#);
    }

    #[test]
    fn test_untagged_data_picks_distinct_key() {
        let names: ResponseData = serde_json::from_str(r#"{"names":["Sheet1","Data"]}"#).unwrap();
        assert_eq!(
            names,
            ResponseData::Names {
                names: vec!["Sheet1".into(), "Data".into()]
            }
        );

        let flag: ResponseData = serde_json::from_str(r#"{"flag":false}"#).unwrap();
        assert_eq!(flag, ResponseData::Flag { flag: false });

        let sheet: ResponseData = serde_json::from_str(r#"{"sheet":"Data"}"#).unwrap();
        assert_eq!(
            sheet,
            ResponseData::Sheet {
                sheet: "Data".into()
            }
        );
    }

    #[test]
    fn test_error_response() {
        let resp: Response =
            serde_json::from_str(r#"{"id":3,"status":"error","message":"boom"}"#).unwrap();
        assert_eq!(resp.id, 3);
        match resp.result {
            ResponseResult::Error { message } => assert_eq!(message, "boom"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
