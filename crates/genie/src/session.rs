//! The prompt-to-execution workflow tying Excel, Foundry and the chat
//! together.

use std::fs;
use std::path::{Path, PathBuf};

use genie_excel::{parse_plan_steps, ExcelHost, ExcelService, PlanStep, WorkbookSource};
use genie_foundry::{
    CancellationToken, CellUploadStats, FoundryClient, FoundryError, ReqwestTransport, Transport,
    UserPrompt,
};
use tracing::{error, info, warn};

use crate::attachments::Attachment;
use crate::chat::ChatManager;
use crate::error::{GenieError, Result};
use crate::recent::RecentFiles;
use crate::settings::{AppPaths, Settings};

pub const NO_ACTIVE_WORKBOOK: &str = "Error: No active workbook to revert.";
pub const BACKUP_NOT_FOUND: &str = "Error: Backup file not found. Unable to revert changes.";
pub const BACKUP_LOAD_FAILED: &str = "Error: Could not load backup file. Unable to revert changes.";
pub const REVERTED: &str = "Changes reverted successfully.";
pub const STEPS_APOLOGY: &str = "I apologize, but I was unable to process your request after \
several attempts. Please try again in a few minutes.";
pub const STEPS_ERROR: &str = "**Error retrieving execution steps**\nPlease try again or contact \
support if the issue persists.";

/// What [`Session::mirror_workbook`] sent to Foundry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirrorReport {
    pub workbook_key: String,
    pub worksheets: usize,
    /// Worksheets that failed and were left out.
    pub skipped_worksheets: Vec<String>,
    pub cells: usize,
    pub charts: usize,
}

/// Result of one [`Session::generate`] round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateOutcome {
    pub agent_plan: String,
    /// `None` when the steps could not be retrieved.
    pub steps: Option<Vec<PlanStep>>,
    pub executed: usize,
    pub execution_error: Option<String>,
    /// Snapshot pushed on the undo stack before the steps ran.
    pub undo_snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UndoOutcome {
    NoWorkbook,
    NothingToUndo,
    BackupMissing(PathBuf),
    LoadFailed(String),
    Reverted(PathBuf),
}

/// One user's working session: an Excel instance, a Foundry client and the
/// conversation about the open workbook.
pub struct Session<H: ExcelHost, T: Transport = ReqwestTransport> {
    excel: ExcelService<H>,
    foundry: FoundryClient<T>,
    chat: ChatManager,
    recent: RecentFiles,
    paths: AppPaths,
    workbook_key: Option<String>,
    attachment: Option<Attachment>,
    rollback_on_failure: bool,
}

impl<H: ExcelHost, T: Transport> Session<H, T> {
    pub fn new(excel: ExcelService<H>, foundry: FoundryClient<T>, paths: AppPaths) -> Self {
        let recent = RecentFiles::load(&paths.recent_files_file);
        Self {
            excel,
            foundry,
            chat: ChatManager::new(),
            recent,
            paths,
            workbook_key: None,
            attachment: None,
            rollback_on_failure: true,
        }
    }

    pub fn apply_settings(&mut self, settings: &Settings) {
        self.chat
            .set_custom_instructions(settings.custom_instructions.trim());
    }

    /// Restore the workbook from a safety copy when a step fails. Only
    /// applies to saved workbooks.
    pub fn set_rollback_on_failure(&mut self, enabled: bool) {
        self.rollback_on_failure = enabled;
    }

    pub fn excel(&self) -> &ExcelService<H> {
        &self.excel
    }

    pub fn excel_mut(&mut self) -> &mut ExcelService<H> {
        &mut self.excel
    }

    pub fn foundry(&self) -> &FoundryClient<T> {
        &self.foundry
    }

    pub fn chat(&self) -> &ChatManager {
        &self.chat
    }

    pub fn chat_mut(&mut self) -> &mut ChatManager {
        &mut self.chat
    }

    pub fn recent(&self) -> &RecentFiles {
        &self.recent
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn workbook_key(&self) -> Option<&str> {
        self.workbook_key.as_deref()
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Open a workbook, remember it in the recent list and mirror it.
    pub async fn load_workbook(&mut self, source: WorkbookSource<'_>) -> Result<MirrorReport> {
        self.workbook_key = None;
        self.excel.load_workbook(source)?;
        if let WorkbookSource::File(path) = source {
            if let Err(e) = self.recent.add(path) {
                warn!(error = %e, "failed to update recent files");
            }
        }
        self.mirror_workbook().await
    }

    /// Send the open workbook, its worksheets, cells and charts to Foundry,
    /// then ask for the workbook summary. A worksheet that fails is logged
    /// and skipped.
    pub async fn mirror_workbook(&mut self) -> Result<MirrorReport> {
        let info = self.excel.workbook_info()?;
        let (file_path, file_size) = match self.excel.current_workbook_path() {
            Some(path) => (
                path.to_string_lossy().into_owned(),
                fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            ),
            None => (info.full_name.clone(), 0),
        };
        info!(workbook = %info.name, "mirroring workbook");

        let workbook = self
            .foundry
            .create_excel_workbook(&info, &file_path, file_size)
            .await?;
        let key = workbook.primary_key;
        self.workbook_key = Some(key.clone());

        let mut report = MirrorReport {
            workbook_key: key.clone(),
            ..Default::default()
        };
        for sheet in self.excel.worksheet_names()? {
            match self.mirror_worksheet(&sheet, &key).await {
                Ok((stats, charts)) => {
                    report.worksheets += 1;
                    report.cells += stats.processed;
                    report.charts += charts;
                }
                Err(e) => {
                    error!(worksheet = %sheet, error = %e, "error processing worksheet");
                    report.skipped_worksheets.push(sheet);
                }
            }
        }

        self.foundry.generate_workbook_summary(&key).await?;
        info!(
            worksheets = report.worksheets,
            cells = report.cells,
            charts = report.charts,
            "workbook mirrored"
        );
        Ok(report)
    }

    async fn mirror_worksheet(
        &mut self,
        sheet: &str,
        workbook_key: &str,
    ) -> Result<(CellUploadStats, usize)> {
        let snapshot = self.excel.worksheet_snapshot(sheet)?;
        let worksheet = self
            .foundry
            .create_excel_worksheet(&snapshot, workbook_key)
            .await?;

        let areas = self.excel.worksheet_cells(sheet)?;
        let stats = self
            .foundry
            .process_worksheet_cells(&areas, &worksheet.primary_key, None)
            .await?;

        let charts = self.excel.worksheet_charts(sheet)?;
        let created = self
            .foundry
            .process_worksheet_charts(&charts, &worksheet.primary_key)
            .await;
        Ok((stats, created))
    }

    /// Extract a document's text to send with the next prompts.
    pub fn attach_file(&mut self, path: &Path) -> Result<&Attachment> {
        match Attachment::load(path) {
            Ok(attachment) => Ok(&*self.attachment.insert(attachment)),
            Err(e) => {
                self.attachment = None;
                Err(e)
            }
        }
    }

    pub fn clear_attachment(&mut self) {
        self.attachment = None;
    }

    /// Run one prompt: record it, get the agent plan, then fetch, show and
    /// execute the plan steps.
    ///
    /// Failures before the plan arrives are returned. Failures while
    /// fetching or running steps are reported in the chat and in the
    /// outcome; only cancellation is returned from that phase.
    pub async fn generate(
        &mut self,
        input: &str,
        selected_range: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<GenerateOutcome> {
        let workbook_key = self
            .workbook_key
            .clone()
            .ok_or(GenieError::NoWorkbookMirrored)?;

        let panel_mark = self.chat.history().len();
        self.chat.add_user_message(input);
        let loading = self.chat.add_loading_message();

        let range = match selected_range {
            Some(r) => Some(r.to_string()),
            None => self.excel.selection_address().ok(),
        };
        let worksheet = self.excel.active_worksheet_name().ok();
        let instructions = self.chat.custom_instructions().to_string();
        let prompt = UserPrompt {
            text: input,
            custom_instructions: Some(instructions.as_str()).filter(|s| !s.is_empty()),
            selected_range: range.as_deref(),
            selected_worksheet: worksheet.as_deref(),
            attachment_context: self.attachment.as_ref().map(|a| a.text.as_str()),
        };

        let planned = request_plan(&mut self.foundry, &prompt, &workbook_key, cancel).await;
        self.chat.remove_loading_message(loading);
        let (prompt_key, agent_plan) = planned?;
        self.chat
            .add_system_response(&format!("Agent Plan\n{agent_plan}"), "");

        let mut outcome = GenerateOutcome {
            agent_plan,
            ..Default::default()
        };

        let body = match self
            .foundry
            .get_plan_steps(&workbook_key, &prompt_key, cancel)
            .await
        {
            Ok(body) => body,
            Err(FoundryError::Cancelled) => return Err(FoundryError::Cancelled.into()),
            Err(e) => {
                error!(error = %e, "error retrieving plan steps");
                let message = match e {
                    FoundryError::Timeout(_) => STEPS_APOLOGY,
                    _ => STEPS_ERROR,
                };
                self.chat.add_system_response(message, "error");
                return Ok(outcome);
            }
        };

        let steps = match parse_plan_steps(&body) {
            Ok(steps) => steps,
            Err(e) => {
                error!(error = %e, "error parsing plan steps");
                return Ok(outcome);
            }
        };
        self.display_and_execute(&steps, panel_mark, &mut outcome);
        outcome.steps = Some(steps);
        Ok(outcome)
    }

    fn display_and_execute(
        &mut self,
        steps: &[PlanStep],
        panel_mark: usize,
        outcome: &mut GenerateOutcome,
    ) {
        for step in steps {
            self.chat.add_system_response(
                &format!(
                    "Step {}) {}\n{}",
                    step.step_index, step.step_title, step.step_past_tense_description
                ),
                "",
            );
        }

        if !steps.iter().any(PlanStep::is_executable) {
            info!("no executable VBA steps found, skipping execution");
            return;
        }

        match self.excel.create_undo_snapshot(&self.paths.genie_folder) {
            Ok(snapshot) => {
                self.chat.push_undo_action(snapshot.clone(), panel_mark);
                outcome.undo_snapshot = Some(snapshot);
            }
            Err(e) => warn!(error = %e, "could not create undo snapshot"),
        }

        info!("starting execution of VBA steps");
        let result = if self.rollback_on_failure && self.excel.current_workbook_path().is_some() {
            self.excel.execute_plan_steps_with_backup(steps)
        } else {
            self.excel.execute_plan_steps(steps)
        };
        match result {
            Ok(count) => {
                info!(count, "VBA steps execution completed");
                outcome.executed = count;
            }
            Err(e) => {
                error!(error = %e, "error executing VBA steps");
                self.chat
                    .add_system_response("**Error**", &format!("Failed to execute steps: {e}"));
                outcome.execution_error = Some(e.to_string());
            }
        }
    }

    /// Revert the latest executed plan by reopening its snapshot. A revert
    /// that cannot be carried out leaves the action on the stack.
    pub fn undo(&mut self) -> UndoOutcome {
        if !self.excel.is_workbook_open() {
            self.chat.add_system_message(NO_ACTIVE_WORKBOOK, None);
            return UndoOutcome::NoWorkbook;
        }
        let Some(action) = self.chat.pop_undo_action() else {
            return UndoOutcome::NothingToUndo;
        };

        let backup = action.backup_file_path.clone();
        if !backup.exists() {
            warn!(backup = %backup.display(), "backup file not found");
            self.chat.restore_undo_action(action);
            self.chat.add_system_message(BACKUP_NOT_FOUND, None);
            return UndoOutcome::BackupMissing(backup);
        }

        info!(backup = %backup.display(), "reverting from backup");
        match self.excel.load_workbook(WorkbookSource::File(&backup)) {
            Ok(()) => {
                self.chat.add_system_message(REVERTED, None);
                UndoOutcome::Reverted(backup)
            }
            Err(e) => {
                error!(error = %e, "error loading backup");
                self.chat.restore_undo_action(action);
                self.chat.add_system_message(BACKUP_LOAD_FAILED, None);
                UndoOutcome::LoadFailed(e.to_string())
            }
        }
    }

    pub async fn check_connection(&self) -> bool {
        self.foundry.check_connection().await
    }

    pub fn close(&mut self) {
        self.excel.close();
    }
}

/// Create the prompt and wait for its agent plan. Returns the prompt key
/// and the plan text.
async fn request_plan<T: Transport>(
    foundry: &mut FoundryClient<T>,
    prompt: &UserPrompt<'_>,
    workbook_key: &str,
    cancel: &CancellationToken,
) -> std::result::Result<(String, String), FoundryError> {
    let prompt_key = foundry.create_user_prompt(prompt).await?;
    let plan = foundry.get_agent_plan(workbook_key, cancel).await?;
    Ok((prompt_key, plan))
}
