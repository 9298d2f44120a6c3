//! Ownership of one Excel instance and its open workbook.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::time::Duration;

use chrono::{DateTime, Local};
use genie_protocol::{
    AppInfo, CellArea, ChartSnapshot, Command, ResponseData, WorkbookInfo, WorksheetSnapshot,
};
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, ExcelError, RestoreOutcome, Result};
use crate::events::{Emitter, ExcelEvent};
use crate::host::ExcelHost;
use crate::plan::{executable_steps, parse_plan_steps, PlanStep};

/// Sent with [`ExcelEvent::WorkbookLoaded`] for a workbook without a path.
pub const NEW_WORKBOOK: &str = "New Workbook";

#[derive(Debug, Clone)]
pub struct ExcelServiceConfig {
    /// Pause after making Excel user-facing, before reporting the workbook loaded.
    pub settle: Duration,
}

impl Default for ExcelServiceConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(500),
        }
    }
}

/// Where [`ExcelService::load_workbook`] gets its workbook from.
#[derive(Debug, Clone, Copy)]
pub enum WorkbookSource<'a> {
    New,
    File(&'a Path),
}

#[derive(Debug)]
struct OpenWorkbook {
    name: String,
    path: Option<PathBuf>,
}

/// Owns one Excel application and at most one open workbook.
///
/// All calls are synchronous and must come from one thread; the bridge
/// executes them in order.
pub struct ExcelService<H: ExcelHost> {
    host: H,
    config: ExcelServiceConfig,
    connected: bool,
    workbook: Option<OpenWorkbook>,
    known_sheets: Vec<String>,
    events: Emitter<ExcelEvent>,
    last_module_stamp: String,
    module_collisions: u32,
}

impl<H: ExcelHost> ExcelService<H> {
    pub fn new(host: H, config: ExcelServiceConfig) -> Self {
        Self {
            host,
            config,
            connected: false,
            workbook: None,
            known_sheets: Vec::new(),
            events: Emitter::default(),
            last_module_stamp: String::new(),
            module_collisions: 0,
        }
    }

    pub fn subscribe(&mut self) -> Receiver<ExcelEvent> {
        self.events.subscribe()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_workbook_open(&self) -> bool {
        self.workbook.is_some()
    }

    /// Local path of the open workbook; `None` for a new, unsaved workbook.
    pub fn current_workbook_path(&self) -> Option<&Path> {
        self.workbook.as_ref().and_then(|wb| wb.path.as_deref())
    }

    pub fn workbook_name(&self) -> Option<&str> {
        self.workbook.as_ref().map(|wb| wb.name.as_str())
    }

    /// Start Excel (hidden, no alerts, no events).
    pub fn initialize(&mut self) -> Result<()> {
        match self.host.send(Command::Init) {
            Ok(_) => {
                info!("Excel initialized");
                self.connected = true;
                self.events.emit(ExcelEvent::ConnectionEstablished);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "error initializing Excel");
                self.connected = false;
                self.events.emit(ExcelEvent::ConnectionLost);
                Err(e.into())
            }
        }
    }

    /// Open a workbook or add a blank one, replacing any open workbook.
    pub fn load_workbook(&mut self, source: WorkbookSource<'_>) -> Result<()> {
        let result = self.try_load_workbook(source);
        if let Err(e) = &result {
            error!(error = %e, "error loading workbook");
            self.events.emit(ExcelEvent::ErrorOccurred(e.to_string()));
        }
        result
    }

    fn try_load_workbook(&mut self, source: WorkbookSource<'_>) -> Result<()> {
        if let WorkbookSource::File(path) = source {
            if !path.exists() {
                return Err(ExcelError::FileNotFound(path.to_path_buf()));
            }
        }

        if !self.connected {
            self.initialize()?;
        }
        self.close_workbook();

        let (command, path) = match source {
            WorkbookSource::New => (Command::CreateWorkbook, None),
            WorkbookSource::File(path) => (
                Command::OpenWorkbook {
                    path: self.host.host_path(path),
                },
                Some(path.to_path_buf()),
            ),
        };
        let opened = match self.host.send(command)? {
            Some(ResponseData::Opened { opened }) => opened,
            _ => return Err(BridgeError::UnexpectedResponse("OpenWorkbook").into()),
        };
        info!(name = %opened.name, path = ?path, "workbook opened");

        self.workbook = Some(OpenWorkbook {
            name: opened.name,
            path,
        });
        self.known_sheets = self.worksheet_names()?;

        self.host.send(Command::SetUserFacing { enabled: true })?;
        if !self.config.settle.is_zero() {
            std::thread::sleep(self.config.settle);
        }

        let loaded = self
            .current_workbook_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| NEW_WORKBOOK.to_string());
        self.events.emit(ExcelEvent::WorkbookLoaded(loaded));
        Ok(())
    }

    /// Close the open workbook without saving.
    fn close_workbook(&mut self) {
        if self.workbook.take().is_some() {
            if let Err(e) = self.host.send(Command::CloseWorkbook { save: false }) {
                warn!(error = %e, "error closing workbook");
            }
            self.known_sheets.clear();
            self.events.emit(ExcelEvent::WorkbookClosed);
        }
    }

    fn require_workbook(&self) -> Result<&OpenWorkbook> {
        self.workbook.as_ref().ok_or(ExcelError::NoWorkbook)
    }

    fn next_module_name(&mut self) -> String {
        let stamp = Local::now().format("%Y%m%d%H%M%S%3f").to_string();
        if stamp == self.last_module_stamp {
            self.module_collisions += 1;
            format!("GenieModule_{stamp}_{}", self.module_collisions)
        } else {
            self.module_collisions = 0;
            self.last_module_stamp = stamp;
            format!("GenieModule_{}", self.last_module_stamp)
        }
    }

    /// Inject `code` as a new standard module, run its `Main`, and remove the
    /// module again unless `remove_after` is false. The module is removed
    /// whether or not the macro succeeded.
    pub fn execute_vba(&mut self, code: &str, remove_after: bool) -> Result<()> {
        self.require_workbook()?;
        let accessible = match self.host.send(Command::VbaProjectAccessible)? {
            Some(ResponseData::Flag { flag }) => flag,
            _ => return Err(BridgeError::UnexpectedResponse("VbaProjectAccessible").into()),
        };
        if !accessible {
            let e = ExcelError::VbaProjectInaccessible;
            error!("{e}");
            return Err(e);
        }

        let module = self.next_module_name();
        debug!(module = %module, code_len = code.len(), "adding VBA module");
        self.host.send(Command::AddModule {
            name: module.clone(),
            code: code.to_string(),
        })?;

        let run = self.host.send(Command::RunMacro {
            name: format!("{module}.Main"),
        });
        if let Err(e) = &run {
            error!(module = %module, error = %e, "error executing VBA code");
        }

        if remove_after {
            if let Err(e) = self.host.send(Command::RemoveModule {
                name: module.clone(),
            }) {
                error!(module = %module, error = %e, "error removing VBA module");
                run?;
                return Err(e.into());
            }
        }
        run?;
        Ok(())
    }

    /// Run the executable steps (those whose VBA declares a `Sub`) in
    /// `stepIndex` order. The first failure stops the run. Returns how many
    /// steps ran.
    pub fn execute_plan_steps(&mut self, steps: &[PlanStep]) -> Result<usize> {
        for skipped in steps.iter().filter(|s| !s.is_executable()) {
            info!(index = skipped.step_index, "skipping step: no executable VBA code found");
        }
        let runnable = executable_steps(steps);
        if runnable.is_empty() {
            info!("no executable VBA steps found");
            return Ok(0);
        }

        info!(count = runnable.len(), "beginning execution of VBA steps");
        for step in &runnable {
            info!(index = step.step_index, title = %step.title(), "executing step");
            self.execute_vba(&step.valid_vba_code, true)
                .map_err(|e| ExcelError::StepFailed {
                    index: step.step_index,
                    title: step.title(),
                    source: Box::new(e),
                })?;
            info!(index = step.step_index, "completed step");
        }
        info!("VBA steps execution completed successfully");
        Ok(runnable.len())
    }

    /// [`Self::execute_plan_steps`] on the `value` array of a plan-steps body.
    pub fn execute_plan_steps_from_json(&mut self, json: &str) -> Result<usize> {
        let steps = parse_plan_steps(json)?;
        self.execute_plan_steps(&steps)
    }

    /// Run the executable steps with a safety copy next to the workbook.
    ///
    /// On failure the workbook is reopened from the copy and the outcome of
    /// that restore is reported with the original error. The copy is deleted
    /// afterwards unless the restore left it as the open workbook.
    pub fn execute_plan_steps_with_backup(&mut self, steps: &[PlanStep]) -> Result<usize> {
        let current = self
            .require_workbook()?
            .path
            .clone()
            .ok_or(ExcelError::UnsavedWorkbook)?;
        if executable_steps(steps).is_empty() {
            return Err(ExcelError::NoPlanSteps);
        }

        let backup = backup_path_for(&current, Local::now());
        self.host.send(Command::SaveCopyAs {
            path: self.host.host_path(&backup),
        })?;
        info!(backup = %backup.display(), "created backup");

        let result = match self.execute_plan_steps(steps) {
            Ok(count) => Ok(count),
            Err(e) => {
                error!(error = %e, "error during plan execution");
                let restore = if backup.exists() {
                    info!("attempting to restore from backup");
                    match self.load_workbook(WorkbookSource::File(&backup)) {
                        Ok(()) => RestoreOutcome::Restored(backup.clone()),
                        Err(re) => {
                            error!(error = %re, "failed to restore backup");
                            RestoreOutcome::Failed(re.to_string())
                        }
                    }
                } else {
                    RestoreOutcome::NoBackup
                };
                Err(ExcelError::PlanFailed {
                    source: Box::new(e),
                    restore,
                })
            }
        };

        let in_use = self.current_workbook_path() == Some(backup.as_path());
        if backup.exists() && !in_use {
            if let Err(e) = fs::remove_file(&backup) {
                error!(backup = %backup.display(), error = %e, "failed to delete backup file");
            }
        }
        result
    }

    /// Save the open workbook to its own file.
    pub fn save(&mut self) -> Result<()> {
        let path = self
            .require_workbook()?
            .path
            .clone()
            .ok_or(ExcelError::NoFilePath)?;
        self.host.send(Command::SaveWorkbook { path: None })?;
        info!(path = %path.display(), "workbook saved");
        Ok(())
    }

    /// Save the open workbook as `path`, which becomes its file.
    pub fn save_as(&mut self, path: &Path) -> Result<()> {
        self.require_workbook()?;
        self.host.send(Command::SaveWorkbook {
            path: Some(self.host.host_path(path)),
        })?;
        if let Some(workbook) = self.workbook.as_mut() {
            if let Some(name) = path.file_name() {
                workbook.name = name.to_string_lossy().into_owned();
            }
            workbook.path = Some(path.to_path_buf());
        }
        info!(path = %path.display(), "workbook saved");
        Ok(())
    }

    /// Save a copy of the open workbook as `backup_<timestamp>.xlsm` in
    /// `folder`, for the user to revert to later.
    pub fn create_undo_snapshot(&mut self, folder: &Path) -> Result<PathBuf> {
        self.require_workbook()?;
        fs::create_dir_all(folder)?;

        let name = format!("backup_{}.xlsm", Local::now().format("%Y%m%d%H%M%S"));
        let path = folder.join(name);
        info!(path = %path.display(), "creating undo snapshot");

        self.host.send(Command::SaveCopyAs {
            path: self.host.host_path(&path),
        })?;
        if !path.exists() {
            return Err(ExcelError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("backup file was not created at {}", path.display()),
            )));
        }
        Ok(path)
    }

    pub fn worksheet_names(&self) -> Result<Vec<String>> {
        self.require_workbook()?;
        match self.host.send(Command::WorksheetNames)? {
            Some(ResponseData::Names { names }) => Ok(names),
            _ => Err(BridgeError::UnexpectedResponse("WorksheetNames").into()),
        }
    }

    fn require_worksheet(&self, name: &str) -> Result<()> {
        if self.worksheet_names()?.iter().any(|n| n == name) {
            Ok(())
        } else {
            Err(ExcelError::WorksheetNotFound(name.to_string()))
        }
    }

    /// Chart names in a worksheet. Problems are logged and yield an empty list.
    pub fn charts_in_worksheet(&self, worksheet: &str) -> Vec<String> {
        let result = self.require_worksheet(worksheet).and_then(|()| {
            match self.host.send(Command::ChartNames {
                sheet: worksheet.to_string(),
            })? {
                Some(ResponseData::Names { names }) => Ok(names),
                _ => Err(BridgeError::UnexpectedResponse("ChartNames").into()),
            }
        });
        result.unwrap_or_else(|e| {
            error!(worksheet, error = %e, "error getting charts in worksheet");
            Vec::new()
        })
    }

    pub fn activate_worksheet(&mut self, name: &str) -> Result<()> {
        self.require_worksheet(name)?;
        self.host.send(Command::ActivateWorksheet {
            name: name.to_string(),
        })?;
        self.events
            .emit(ExcelEvent::WorksheetActivated(name.to_string()));
        Ok(())
    }

    pub fn active_worksheet_name(&self) -> Result<String> {
        self.require_workbook()?;
        match self.host.send(Command::ActiveWorksheet)? {
            Some(ResponseData::Sheet { sheet }) => Ok(sheet),
            _ => Err(BridgeError::UnexpectedResponse("ActiveWorksheet").into()),
        }
    }

    pub fn selection_address(&self) -> Result<String> {
        self.require_workbook()?;
        match self.host.send(Command::Selection)? {
            Some(ResponseData::Address { address }) => Ok(address),
            _ => Err(BridgeError::UnexpectedResponse("Selection").into()),
        }
    }

    /// Compare the workbook's sheets with the last known list and report
    /// renames and deletions. A sheet that disappeared while a new name
    /// appeared is treated as renamed.
    pub fn sync_worksheets(&mut self) -> Result<()> {
        let current = self.worksheet_names()?;
        let removed: Vec<&String> = self
            .known_sheets
            .iter()
            .filter(|n| !current.contains(n))
            .collect();
        let mut added = current.iter().filter(|n| !self.known_sheets.contains(n));

        let mut events = Vec::new();
        for old in removed {
            match added.next() {
                Some(new) => events.push(ExcelEvent::WorksheetRenamed {
                    old: old.clone(),
                    new: new.clone(),
                }),
                None => events.push(ExcelEvent::WorksheetDeleted(old.clone())),
            }
        }
        for event in events {
            debug!(?event, "worksheet change");
            self.events.emit(event);
        }
        self.known_sheets = current;
        Ok(())
    }

    pub fn worksheet_snapshot(&self, name: &str) -> Result<WorksheetSnapshot> {
        self.require_workbook()?;
        match self.host.send(Command::WorksheetInfo {
            sheet: name.to_string(),
        })? {
            Some(ResponseData::Worksheet { worksheet }) => Ok(worksheet),
            _ => Err(BridgeError::UnexpectedResponse("WorksheetInfo").into()),
        }
    }

    pub fn worksheet_cells(&self, name: &str) -> Result<Vec<CellArea>> {
        self.require_workbook()?;
        match self.host.send(Command::WorksheetCells {
            sheet: name.to_string(),
        })? {
            Some(ResponseData::Cells { areas }) => Ok(areas),
            _ => Err(BridgeError::UnexpectedResponse("WorksheetCells").into()),
        }
    }

    pub fn worksheet_charts(&self, name: &str) -> Result<Vec<ChartSnapshot>> {
        self.require_workbook()?;
        match self.host.send(Command::WorksheetCharts {
            sheet: name.to_string(),
        })? {
            Some(ResponseData::Charts { charts }) => Ok(charts),
            _ => Err(BridgeError::UnexpectedResponse("WorksheetCharts").into()),
        }
    }

    pub fn workbook_info(&self) -> Result<WorkbookInfo> {
        self.require_workbook()?;
        match self.host.send(Command::WorkbookInfo)? {
            Some(ResponseData::Workbook { workbook }) => Ok(workbook),
            _ => Err(BridgeError::UnexpectedResponse("WorkbookInfo").into()),
        }
    }

    pub fn application_info(&self) -> Result<AppInfo> {
        match self.host.send(Command::ApplicationInfo)? {
            Some(ResponseData::Application { application }) => Ok(application),
            _ => Err(BridgeError::UnexpectedResponse("ApplicationInfo").into()),
        }
    }

    /// Used-range text of a worksheet for prompt context.
    pub fn worksheet_text(&self, name: &str) -> Result<String> {
        self.require_workbook()?;
        match self.host.send(Command::WorksheetText {
            sheet: name.to_string(),
        })? {
            Some(ResponseData::Text { text }) => Ok(text),
            _ => Err(BridgeError::UnexpectedResponse("WorksheetText").into()),
        }
    }

    pub fn active_worksheet_text(&self) -> Result<String> {
        let sheet = self.active_worksheet_name()?;
        self.worksheet_text(&sheet)
    }

    /// Close the workbook without saving and quit Excel. Safe to call more
    /// than once.
    pub fn close(&mut self) {
        if !self.connected && self.workbook.is_none() {
            return;
        }
        self.close_workbook();
        if self.connected {
            if let Err(e) = self.host.send(Command::Shutdown) {
                warn!(error = %e, "error shutting down Excel");
            }
            self.connected = false;
            self.events.emit(ExcelEvent::ConnectionLost);
        }
        info!("Excel closed");
    }
}

impl<H: ExcelHost> Drop for ExcelService<H> {
    fn drop(&mut self) {
        self.close();
    }
}

/// `Backup_<stem>_<yyyyMMddHHmmssfff><ext>` next to `workbook`.
pub fn backup_path_for(workbook: &Path, now: DateTime<Local>) -> PathBuf {
    let stem = workbook
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = workbook
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let name = format!("Backup_{stem}_{}{ext}", now.format("%Y%m%d%H%M%S%3f"));
    workbook.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use crate::fake::{FakeExcel, FakeState};

    fn service(state: FakeState) -> ExcelService<FakeExcel> {
        ExcelService::new(
            FakeExcel::new(state),
            ExcelServiceConfig {
                settle: Duration::ZERO,
            },
        )
    }

    fn drain(rx: &Receiver<ExcelEvent>) -> Vec<ExcelEvent> {
        rx.try_iter().collect()
    }

    fn step(index: i64, code: &str) -> PlanStep {
        PlanStep {
            step_index: index,
            step_title: format!("Step title {index}"),
            step_past_tense_description: String::new(),
            valid_vba_code: code.to_string(),
        }
    }

    fn workbook_on_disk(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("Budget.xlsx");
        std::fs::write(&path, b"original").unwrap();
        path
    }

    #[test]
    fn test_load_missing_file_reports_error() {
        let mut excel = service(FakeState::default());
        let events = excel.subscribe();

        let missing = PathBuf::from("/no/such/Budget.xlsx");
        let err = excel
            .load_workbook(WorkbookSource::File(&missing))
            .unwrap_err();
        assert!(matches!(err, ExcelError::FileNotFound(ref p) if *p == missing));

        // Excel is never started for a missing file
        assert!(excel.host().state().commands.is_empty());
        match drain(&events).as_slice() {
            [ExcelEvent::ErrorOccurred(msg)] => assert!(msg.contains("File not found")),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_load_new_workbook_events() {
        let mut excel = service(FakeState::default());
        let events = excel.subscribe();

        excel.load_workbook(WorkbookSource::New).unwrap();

        assert!(excel.is_workbook_open());
        assert_eq!(excel.current_workbook_path(), None);
        assert_eq!(excel.workbook_name(), Some("Book1"));
        assert_eq!(
            drain(&events),
            vec![
                ExcelEvent::ConnectionEstablished,
                ExcelEvent::WorkbookLoaded(NEW_WORKBOOK.to_string()),
            ]
        );
        let commands = excel.host().state().commands.clone();
        assert_eq!(commands[0], Command::Init);
        assert_eq!(commands[1], Command::CreateWorkbook);
        assert!(commands.contains(&Command::SetUserFacing { enabled: true }));
    }

    #[test]
    fn test_failed_init_reports_connection_lost() {
        let mut excel = service(FakeState {
            fail_init: true,
            ..Default::default()
        });
        let events = excel.subscribe();

        assert!(excel.load_workbook(WorkbookSource::New).is_err());
        let events = drain(&events);
        assert_eq!(events[0], ExcelEvent::ConnectionLost);
        assert!(matches!(events[1], ExcelEvent::ErrorOccurred(_)));
        assert!(!excel.is_connected());
    }

    #[test]
    fn test_loading_replaces_open_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = workbook_on_disk(&dir);
        let mut excel = service(FakeState::default());

        excel.load_workbook(WorkbookSource::New).unwrap();
        excel.load_workbook(WorkbookSource::File(&path)).unwrap();

        assert_eq!(excel.current_workbook_path(), Some(path.as_path()));
        assert!(excel
            .host()
            .state()
            .commands
            .contains(&Command::CloseWorkbook { save: false }));
    }

    #[test]
    fn test_plan_steps_run_in_index_order() {
        let mut excel = service(FakeState::default());
        excel.load_workbook(WorkbookSource::New).unwrap();

        let steps = vec![
            step(2, "' explanation only, nothing to run"),
            step(1, "Sub Main()\n' one\nEnd Sub"),
            step(3, "Sub Main()\n' three\nEnd Sub"),
        ];
        let ran = excel.execute_plan_steps(&steps).unwrap();

        assert_eq!(ran, 2);
        let state = excel.host().state();
        assert_eq!(
            state.ran,
            vec![
                "Sub Main()\n' one\nEnd Sub".to_string(),
                "Sub Main()\n' three\nEnd Sub".to_string(),
            ]
        );
        assert!(state.modules.is_empty());
    }

    #[test]
    fn test_plan_steps_from_json() {
        let mut excel = service(FakeState::default());
        excel.load_workbook(WorkbookSource::New).unwrap();

        let json = r#"{"value":[
            {"stepIndex":2,"stepTitle":"B","validVBACode":"Sub Main()\n'b\nEnd Sub"},
            {"stepIndex":1,"stepTitle":"A","validVBACode":"Sub Main()\n'a\nEnd Sub"}
        ]}"#;
        assert_eq!(excel.execute_plan_steps_from_json(json).unwrap(), 2);
        let ran = excel.host().state().ran.clone();
        assert!(ran[0].contains("'a"));
        assert!(ran[1].contains("'b"));
    }

    #[test]
    fn test_failing_step_stops_the_run_and_removes_its_module() {
        let mut excel = service(FakeState::default());
        excel.load_workbook(WorkbookSource::New).unwrap();

        let steps = vec![
            step(1, "Sub Main()\nErr.Raise 1004\nEnd Sub"),
            step(2, "Sub Main()\nEnd Sub"),
        ];
        let err = excel.execute_plan_steps(&steps).unwrap_err();

        match err {
            ExcelError::StepFailed { index, title, .. } => {
                assert_eq!(index, 1);
                assert_eq!(title, "Step title 1");
            }
            other => panic!("unexpected error: {other}"),
        }
        let state = excel.host().state();
        assert!(state.ran.is_empty());
        assert!(state.modules.is_empty(), "module must be removed after a failed run");
    }

    #[test]
    fn test_keep_module_after_run() {
        let mut excel = service(FakeState::default());
        excel.load_workbook(WorkbookSource::New).unwrap();

        excel.execute_vba("Sub Main()\nEnd Sub", false).unwrap();
        let state = excel.host().state();
        assert_eq!(state.modules.len(), 1);
        assert!(state.modules.keys().all(|m| m.starts_with("GenieModule_")));
    }

    #[test]
    fn test_vba_project_inaccessible() {
        let mut excel = service(FakeState {
            vba_accessible: false,
            ..Default::default()
        });
        excel.load_workbook(WorkbookSource::New).unwrap();

        let err = excel.execute_vba("Sub Main()\nEnd Sub", true).unwrap_err();
        assert!(matches!(err, ExcelError::VbaProjectInaccessible));
        assert!(err
            .to_string()
            .contains("'Trust access to the VBA project object model' is enabled"));
        assert!(excel.host().state().modules.is_empty());
    }

    #[test]
    fn test_vba_requires_workbook() {
        let mut excel = service(FakeState::default());
        assert!(matches!(
            excel.execute_vba("Sub Main()\nEnd Sub", true),
            Err(ExcelError::NoWorkbook)
        ));
    }

    #[test]
    fn test_failed_plan_restores_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = workbook_on_disk(&dir);
        let mut excel = service(FakeState::default());
        excel.load_workbook(WorkbookSource::File(&path)).unwrap();

        let steps = vec![
            step(1, "Sub Main()\nEnd Sub"),
            step(2, "Sub Main()\nErr.Raise 5\nEnd Sub"),
        ];
        let err = excel.execute_plan_steps_with_backup(&steps).unwrap_err();

        let backup = match err {
            ExcelError::PlanFailed {
                source,
                restore: RestoreOutcome::Restored(backup),
            } => {
                assert!(matches!(*source, ExcelError::StepFailed { index: 2, .. }));
                backup
            }
            other => panic!("unexpected error: {other}"),
        };

        // the backup is now the open workbook and is kept on disk
        assert_eq!(excel.current_workbook_path(), Some(backup.as_path()));
        assert!(backup.exists());
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("Backup_Budget_"));
        assert!(name.ends_with(".xlsx"));
    }

    #[test]
    fn test_successful_plan_deletes_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = workbook_on_disk(&dir);
        let mut excel = service(FakeState::default());
        excel.load_workbook(WorkbookSource::File(&path)).unwrap();

        let ran = excel
            .execute_plan_steps_with_backup(&[step(1, "Sub Main()\nEnd Sub")])
            .unwrap();

        assert_eq!(ran, 1);
        assert_eq!(excel.current_workbook_path(), Some(path.as_path()));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("Budget.xlsx")]);
    }

    #[test]
    fn test_backup_needs_saved_workbook_and_steps() {
        let mut excel = service(FakeState::default());
        excel.load_workbook(WorkbookSource::New).unwrap();
        assert!(matches!(
            excel.execute_plan_steps_with_backup(&[step(1, "Sub Main()\nEnd Sub")]),
            Err(ExcelError::UnsavedWorkbook)
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = workbook_on_disk(&dir);
        excel.load_workbook(WorkbookSource::File(&path)).unwrap();
        assert!(matches!(
            excel.execute_plan_steps_with_backup(&[step(1, "no code")]),
            Err(ExcelError::NoPlanSteps)
        ));
    }

    #[test]
    fn test_undo_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut excel = service(FakeState::default());
        excel.load_workbook(WorkbookSource::New).unwrap();

        let folder = dir.path().join("GenieForExcel");
        let snapshot = excel.create_undo_snapshot(&folder).unwrap();

        assert!(snapshot.exists());
        assert_eq!(snapshot.parent(), Some(folder.as_path()));
        let name = snapshot.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("backup_") && name.ends_with(".xlsm"));
    }

    #[test]
    fn test_sync_worksheets_reports_rename_and_delete() {
        let mut excel = service(FakeState {
            sheets: vec!["Data".into(), "Summary".into(), "Scratch".into()],
            ..Default::default()
        });
        excel.load_workbook(WorkbookSource::New).unwrap();
        let events = excel.subscribe();

        excel.host().state_mut().sheets = vec!["Inputs".into(), "Summary".into()];
        excel.sync_worksheets().unwrap();

        assert_eq!(
            drain(&events),
            vec![
                ExcelEvent::WorksheetRenamed {
                    old: "Data".into(),
                    new: "Inputs".into()
                },
                ExcelEvent::WorksheetDeleted("Scratch".into()),
            ]
        );

        excel.sync_worksheets().unwrap();
        assert!(drain(&events).is_empty());
    }

    #[test]
    fn test_activate_worksheet() {
        let mut excel = service(FakeState {
            sheets: vec!["Data".into(), "Summary".into()],
            ..Default::default()
        });
        excel.load_workbook(WorkbookSource::New).unwrap();
        let events = excel.subscribe();

        excel.activate_worksheet("Summary").unwrap();
        assert_eq!(excel.active_worksheet_name().unwrap(), "Summary");
        assert_eq!(
            drain(&events),
            vec![ExcelEvent::WorksheetActivated("Summary".into())]
        );

        assert!(matches!(
            excel.activate_worksheet("Missing"),
            Err(ExcelError::WorksheetNotFound(name)) if name == "Missing"
        ));
    }

    #[test]
    fn test_charts_in_missing_worksheet_is_empty() {
        let mut excel = service(FakeState::default());
        assert!(excel.charts_in_worksheet("Sheet1").is_empty());

        excel.load_workbook(WorkbookSource::New).unwrap();
        assert!(excel.charts_in_worksheet("Nope").is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut excel = service(FakeState::default());
        excel.load_workbook(WorkbookSource::New).unwrap();
        let events = excel.subscribe();

        excel.close();
        excel.close();

        assert_eq!(
            drain(&events),
            vec![ExcelEvent::WorkbookClosed, ExcelEvent::ConnectionLost]
        );
        let shutdowns = excel
            .host()
            .state()
            .commands
            .iter()
            .filter(|c| **c == Command::Shutdown)
            .count();
        assert_eq!(shutdowns, 1);
    }

    #[test]
    fn test_save_writes_the_open_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = workbook_on_disk(&dir);
        let mut excel = service(FakeState::default());
        excel.load_workbook(WorkbookSource::File(&path)).unwrap();
        excel
            .execute_vba("Sub Main()\n' edit\nEnd Sub", true)
            .unwrap();

        excel.save().unwrap();
        excel.close();

        let state = excel.host().state();
        assert_eq!(state.saves, 1);
        let commands = &state.commands;
        let saved = commands
            .iter()
            .position(|c| *c == Command::SaveWorkbook { path: None })
            .unwrap();
        let closed = commands
            .iter()
            .position(|c| matches!(c, Command::CloseWorkbook { .. }))
            .unwrap();
        assert!(saved < closed);
    }

    #[test]
    fn test_new_workbook_needs_save_as() {
        let dir = tempfile::tempdir().unwrap();
        let mut excel = service(FakeState::default());
        excel.load_workbook(WorkbookSource::New).unwrap();

        assert!(matches!(excel.save(), Err(ExcelError::NoFilePath)));

        let target = dir.path().join("Forecast.xlsx");
        excel.save_as(&target).unwrap();
        assert!(target.exists());
        assert_eq!(excel.current_workbook_path(), Some(target.as_path()));
        assert_eq!(excel.workbook_name(), Some("Forecast.xlsx"));

        excel.save().unwrap();
        assert_eq!(excel.host().state().saves, 2);
    }

    #[test]
    fn test_backup_path_for() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let path = backup_path_for(Path::new("/data/Budget.xlsx"), now);
        assert_eq!(
            path,
            PathBuf::from("/data/Backup_Budget_20240309140507000.xlsx")
        );
    }
}
