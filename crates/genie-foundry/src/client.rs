use std::future::Future;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use genie_protocol::{CellArea, ChartSnapshot, WorkbookInfo, WorksheetSnapshot};

use crate::error::{FoundryError, Result};
use crate::params::{self, Parameters, UserPrompt};
use crate::response::ActionResponse;
use crate::transport::{HttpResponse, ReqwestTransport, Transport};

pub const CREATE_USER_PROMPT: &str = "create-user-prompt";
pub const GET_AGENT_PLAN: &str = "get-agent-plan";
pub const CREATE_EXCEL_WORKBOOK: &str = "create-excel-workbook";
pub const CREATE_EXCEL_WORKSHEET: &str = "create-excel-worksheet";
pub const CREATE_EXCEL_CELL: &str = "create-excel-cell";
pub const CREATE_EXCEL_CHART: &str = "create-excel-chart";
pub const GENERATE_WORKBOOK_SUMMARY: &str = "generate-workbook-summary";
pub const PLAN_STEPS_QUERY: &str = "genieForExcelPlanSteps";

/// Configuration for [`FoundryClient`].
#[derive(Debug, Clone)]
pub struct FoundryConfig {
    /// Stack URL up to and excluding `/v2`, e.g. `https://example.palantirfoundry.com/api`.
    pub base_url: String,
    /// Ontology API name or RID.
    pub ontology_id: String,
    /// Delay between agent-plan polls and between plan-steps retries.
    pub poll_interval: Duration,
    /// How long to wait for the workbook's `agentPlan` to appear.
    pub agent_plan_timeout: Duration,
    pub plan_steps_max_attempts: u32,
    /// Cells per `applyBatch` request.
    pub cell_batch_size: usize,
}

impl Default for FoundryConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            ontology_id: String::new(),
            poll_interval: Duration::from_secs(5),
            agent_plan_timeout: Duration::from_secs(300),
            plan_steps_max_attempts: 60,
            cell_batch_size: 20,
        }
    }
}

/// A locally generated GUID and the primary key the ontology assigned to the
/// object created with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReference {
    pub local_guid: String,
    pub primary_key: String,
}

/// Counts from one [`FoundryClient::process_worksheet_cells`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellUploadStats {
    pub processed: usize,
    pub skipped: usize,
    pub batches: usize,
    /// Cells lost to a failed validation or a failed batch.
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy)]
enum ApplyMode {
    ValidateOnly,
    ValidateAndExecute,
}

impl ApplyMode {
    fn options(self) -> Value {
        match self {
            ApplyMode::ValidateOnly => json!({"mode": "VALIDATE_ONLY", "returnEdits": "NONE"}),
            ApplyMode::ValidateAndExecute => {
                json!({"mode": "VALIDATE_AND_EXECUTE", "returnEdits": "ALL"})
            }
        }
    }
}

/// Run `fut` unless `cancel` fires first.
async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FoundryError::Cancelled),
        out = fut => Ok(out),
    }
}

/// The workbook object's `agentPlan` property, if set and not blank.
fn agent_plan_field(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let plan = match value.get("agentPlan")? {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if plan.trim().is_empty() {
        None
    } else {
        Some(plan)
    }
}

/// Client for the Genie ontology on Palantir Foundry.
///
/// Holds the key of the most recent user prompt and the once-per-lifetime
/// validation latches for cell and chart creation.
pub struct FoundryClient<T = ReqwestTransport> {
    transport: T,
    config: FoundryConfig,
    latest_prompt_key: Option<String>,
    cell_validation_done: bool,
    chart_validation_done: bool,
}

impl FoundryClient<ReqwestTransport> {
    /// Client over HTTPS with bearer `token`.
    pub fn connect(config: FoundryConfig, token: impl Into<String>) -> Self {
        Self::new(ReqwestTransport::new(token), config)
    }
}

impl<T: Transport> FoundryClient<T> {
    pub fn new(transport: T, config: FoundryConfig) -> Self {
        Self {
            transport,
            config,
            latest_prompt_key: None,
            cell_validation_done: false,
            chart_validation_done: false,
        }
    }

    pub fn config(&self) -> &FoundryConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Key of the last prompt created with [`Self::create_user_prompt`].
    pub fn latest_prompt_key(&self) -> Option<&str> {
        self.latest_prompt_key.as_deref()
    }

    pub fn set_latest_prompt_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        info!(key = %key, "Updated latest prompt key");
        self.latest_prompt_key = Some(key);
    }

    fn ontology_url(&self) -> String {
        format!(
            "{}/v2/ontologies/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.ontology_id
        )
    }

    fn action_url(&self, action: &str, batch: bool) -> String {
        let verb = if batch { "applyBatch" } else { "apply" };
        format!("{}/actions/{action}/{verb}", self.ontology_url())
    }

    fn query_url(&self, query: &str) -> String {
        format!("{}/queries/{query}/execute", self.ontology_url())
    }

    async fn post(&self, action: &str, url: &str, body: &Value) -> Result<HttpResponse> {
        debug!(action, url, body = %body, "Request");
        let response = self.transport.post_json(url, body).await.map_err(|e| {
            error!(action, url, error = %e, "Request failed");
            e
        })?;
        debug!(action, status = response.status, body = %response.body, "Response");

        if !response.is_success() {
            error!(
                action,
                status = response.status,
                body = %response.body,
                request = %body,
                "Request returned an error status"
            );
            return Err(FoundryError::Status {
                action: action.to_string(),
                status: response.status,
                body: response.body,
            });
        }
        Ok(response)
    }

    async fn apply(
        &self,
        action: &str,
        parameters: Parameters,
        mode: ApplyMode,
    ) -> Result<(ActionResponse, String)> {
        let body = json!({
            "parameters": parameters,
            "options": mode.options(),
        });
        let response = self.post(action, &self.action_url(action, false), &body).await?;
        Ok((ActionResponse::parse(&response.body), response.body))
    }

    /// Run `action` in `VALIDATE_ONLY` mode.
    async fn validate(&self, action: &str, parameters: Parameters) -> Result<()> {
        info!(action, "Validating parameters");
        let (response, body) = self
            .apply(action, parameters, ApplyMode::ValidateOnly)
            .await?;
        if let Some(result) = response.validation_result() {
            if result != "VALID" {
                error!(action, result, "Parameter validation failed");
                return Err(FoundryError::ValidationFailed {
                    action: action.to_string(),
                    body,
                });
            }
        }
        info!(action, "Parameter validation successful");
        Ok(())
    }

    fn require_primary_key(action: &str, response: &ActionResponse, body: String) -> Result<String> {
        match response.first_primary_key() {
            Some(key) => {
                info!(action, key = %key, "Extracted primary key");
                Ok(key)
            }
            None => {
                error!(action, body = %body, "Failed to extract primary key");
                Err(FoundryError::MissingPrimaryKey {
                    action: action.to_string(),
                    body,
                })
            }
        }
    }

    /// Create a user prompt object and remember its key for
    /// [`Self::get_agent_plan`]. Returns the key.
    pub async fn create_user_prompt(&mut self, prompt: &UserPrompt<'_>) -> Result<String> {
        info!(
            selected_range = prompt.selected_range.unwrap_or("None"),
            selected_worksheet = prompt.selected_worksheet.unwrap_or("None"),
            "Creating user prompt"
        );
        let prompt_guid = params::new_guid();
        let parameters = params::prompt_parameters(prompt, &prompt_guid, &params::timestamp());

        let (response, body) = self
            .apply(CREATE_USER_PROMPT, parameters, ApplyMode::ValidateAndExecute)
            .await?;

        let key = match response.first_key_or_rid() {
            Some(key) => key,
            None if response.is_valid() => {
                info!("Using prompt guid as fallback primary key");
                prompt_guid
            }
            None => {
                error!(body = %body, "Failed to extract prompt key");
                return Err(FoundryError::MissingPrimaryKey {
                    action: CREATE_USER_PROMPT.to_string(),
                    body,
                });
            }
        };

        self.set_latest_prompt_key(key.clone());
        Ok(key)
    }

    /// Ask the planner for an agent plan for the latest prompt and wait for it
    /// to appear on the workbook object.
    pub async fn get_agent_plan(
        &self,
        workbook_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let prompt_key = self.latest_prompt_key.clone().ok_or_else(|| {
            FoundryError::InvalidArgument("no user prompt has been created".to_string())
        })?;
        info!(prompt = %prompt_key, workbook = workbook_id, "Requesting agent plan");

        let mut parameters = Parameters::new();
        parameters.insert("userPrompt".into(), json!(prompt_key));
        parameters.insert("excelWorkbook".into(), json!(workbook_id));
        cancellable(
            cancel,
            self.apply(GET_AGENT_PLAN, parameters, ApplyMode::ValidateAndExecute),
        )
        .await??;

        let plan = self.poll_for_agent_plan(workbook_id, cancel).await?;
        info!(chars = plan.len(), "Agent plan received");

        // Kick the plan-steps query once; the caller polls for the result.
        let body = json!({
            "parameters": {"excelWorkbook": workbook_id, "userPrompt": prompt_key}
        });
        match cancellable(cancel, self.transport.post_json(&self.query_url(PLAN_STEPS_QUERY), &body))
            .await?
        {
            Ok(response) if response.is_success() => info!("Plan steps retrieved"),
            Ok(response) => warn!(
                status = response.status,
                body = %response.body,
                "Plan steps not ready yet"
            ),
            Err(e) => warn!(error = %e, "Plan steps request failed"),
        }

        Ok(plan)
    }

    async fn poll_for_agent_plan(
        &self,
        workbook_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let url = format!("{}/objects/ExcelWorkbook/{workbook_id}", self.ontology_url());
        let timeout = self.config.agent_plan_timeout;
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            match cancellable(cancel, self.transport.get(&url)).await? {
                Ok(response) if response.is_success() => {
                    if let Some(plan) = agent_plan_field(&response.body) {
                        return Ok(plan);
                    }
                }
                Ok(response) => debug!(status = response.status, "Workbook poll not successful"),
                Err(e) => error!(error = %e, "Error polling for agent plan"),
            }
            info!(
                interval_secs = self.config.poll_interval.as_secs(),
                "No agent plan found yet, waiting before next attempt"
            );
            cancellable(cancel, sleep(self.config.poll_interval)).await?;
        }

        Err(FoundryError::Timeout(format!(
            "waiting for agent plan after {} seconds",
            timeout.as_secs()
        )))
    }

    /// Poll the plan-steps query until it answers. Retries while the backend
    /// reports a query timeout; any other error status aborts at once.
    /// Returns the raw JSON body (`{"value": [...]}`).
    pub async fn get_plan_steps(
        &self,
        workbook_id: &str,
        prompt_key: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let url = self.query_url(PLAN_STEPS_QUERY);
        let body = json!({
            "parameters": {"excelWorkbook": workbook_id, "userPrompt": prompt_key}
        });
        let attempts = self.config.plan_steps_max_attempts.max(1);

        for attempt in 1..=attempts {
            match cancellable(cancel, self.post(PLAN_STEPS_QUERY, &url, &body)).await? {
                Ok(response) => {
                    info!(attempt, "Plan steps retrieved");
                    return Ok(response.body);
                }
                Err(e) if e.is_query_timeout() => {
                    info!(attempt, attempts, "Plan steps query timed out, retrying");
                }
                Err(e @ FoundryError::Status { .. }) => return Err(e),
                Err(e) => {
                    error!(attempt, error = %e, "Error fetching plan steps");
                    if attempt == attempts {
                        return Err(e);
                    }
                }
            }
            if attempt < attempts {
                cancellable(cancel, sleep(self.config.poll_interval)).await?;
            }
        }

        Err(FoundryError::Timeout(format!(
            "plan steps not ready after {attempts} attempts"
        )))
    }

    pub async fn create_excel_workbook(
        &self,
        info: &WorkbookInfo,
        file_path: &str,
        file_size: u64,
    ) -> Result<EntityReference> {
        let local_guid = params::new_guid();
        let parameters =
            params::workbook_parameters(info, file_path, file_size, &local_guid, &params::timestamp());

        let (response, body) = self
            .apply(CREATE_EXCEL_WORKBOOK, parameters, ApplyMode::ValidateAndExecute)
            .await?;
        let primary_key = Self::require_primary_key(CREATE_EXCEL_WORKBOOK, &response, body)?;
        Ok(EntityReference {
            local_guid,
            primary_key,
        })
    }

    pub async fn create_excel_worksheet(
        &self,
        sheet: &WorksheetSnapshot,
        workbook_key: &str,
    ) -> Result<EntityReference> {
        info!(worksheet = %sheet.name, workbook = workbook_key, "Creating worksheet");
        let local_guid = params::new_guid();
        let parameters =
            params::worksheet_parameters(sheet, workbook_key, &local_guid, &params::timestamp());

        let (response, body) = self
            .apply(CREATE_EXCEL_WORKSHEET, parameters, ApplyMode::ValidateAndExecute)
            .await?;
        let primary_key = Self::require_primary_key(CREATE_EXCEL_WORKSHEET, &response, body)?;
        Ok(EntityReference {
            local_guid,
            primary_key,
        })
    }

    async fn send_cell_batch(&self, batch: &[Parameters]) -> Result<()> {
        let requests: Vec<Value> = batch.iter().map(|p| json!({"parameters": p})).collect();
        let body = json!({
            "requests": requests,
            "options": {"returnEdits": "NONE"},
        });
        self.post(CREATE_EXCEL_CELL, &self.action_url(CREATE_EXCEL_CELL, true), &body)
            .await?;
        Ok(())
    }

    /// Mirror the non-blank cells of a worksheet, row-major per area, in
    /// batches of `cell_batch_size`.
    ///
    /// The first cell of the client's lifetime is validated before any batch
    /// is sent; a cell that fails validation is dropped and the next one is
    /// validated instead. A failed batch is logged and the remaining cells
    /// are still sent. Only a failed final batch is returned, after one
    /// resend.
    pub async fn process_worksheet_cells(
        &mut self,
        areas: &[CellArea],
        worksheet_key: &str,
        range_guid: Option<&str>,
    ) -> Result<CellUploadStats> {
        info!(worksheet = worksheet_key, areas = areas.len(), "Processing cells");
        let batch_size = self.config.cell_batch_size.max(1);
        let timestamp = params::timestamp();
        let mut stats = CellUploadStats::default();
        let mut batch: Vec<Parameters> = Vec::with_capacity(batch_size);

        for area in areas {
            debug!(
                first_row = area.first_row,
                first_column = area.first_column,
                rows = area.rows,
                columns = area.columns,
                "Processing area"
            );
            for cell in &area.cells {
                if cell.is_blank_or_default() {
                    stats.skipped += 1;
                    continue;
                }

                let parameters = params::cell_parameters(cell, worksheet_key, range_guid, &timestamp);
                if !self.cell_validation_done && batch.is_empty() {
                    if let Err(e) = self.validate(CREATE_EXCEL_CELL, parameters.clone()).await {
                        error!(cell = %cell.address, error = %e, "Error processing cell");
                        stats.dropped += 1;
                        continue;
                    }
                    self.cell_validation_done = true;
                }

                batch.push(parameters);
                stats.processed += 1;

                if batch.len() >= batch_size {
                    stats.batches += 1;
                    info!(batch = stats.batches, cells = batch.len(), "Sending batch");
                    if let Err(e) = self.send_cell_batch(&batch).await {
                        error!(batch = stats.batches, error = %e, "Failed to send batch");
                        stats.dropped += batch.len();
                    }
                    batch.clear();
                }
            }
        }

        if !batch.is_empty() {
            stats.batches += 1;
            info!(batch = stats.batches, cells = batch.len(), "Sending final batch");
            if let Err(e) = self.send_cell_batch(&batch).await {
                error!(batch = stats.batches, error = %e, "Failed to send final batch");
                self.flush_remaining(&batch).await;
                return Err(e);
            }
        }

        info!(
            processed = stats.processed,
            skipped = stats.skipped,
            batches = stats.batches,
            dropped = stats.dropped,
            "Worksheet cells processed"
        );
        Ok(stats)
    }

    async fn flush_remaining(&self, batch: &[Parameters]) {
        info!(
            cells = batch.len(),
            "Attempting to send remaining cells before exiting"
        );
        match self.send_cell_batch(batch).await {
            Ok(()) => info!("Successfully sent remaining cells"),
            Err(e) => error!(error = %e, "Failed to send remaining cells"),
        }
    }

    /// Mirror every chart of a worksheet. A chart that fails is logged and
    /// skipped. Returns the number of charts created.
    pub async fn process_worksheet_charts(
        &mut self,
        charts: &[ChartSnapshot],
        worksheet_key: &str,
    ) -> usize {
        info!(worksheet = worksheet_key, charts = charts.len(), "Processing charts");
        let mut created = 0;
        for chart in charts {
            match self.process_chart(chart, worksheet_key).await {
                Ok(()) => created += 1,
                Err(e) => error!(chart = %chart.name, error = %e, "Error processing chart"),
            }
        }
        created
    }

    pub async fn process_chart(&mut self, chart: &ChartSnapshot, worksheet_key: &str) -> Result<()> {
        info!(chart = %chart.name, "Processing chart");
        let parameters = params::chart_parameters(chart, worksheet_key, &params::timestamp());

        if !self.chart_validation_done {
            self.validate(CREATE_EXCEL_CHART, parameters.clone()).await?;
            self.chart_validation_done = true;
        }

        self.apply(CREATE_EXCEL_CHART, parameters, ApplyMode::ValidateAndExecute)
            .await?;
        info!(chart = %chart.name, "Chart created");
        Ok(())
    }

    /// Ask the ontology to summarize a mirrored workbook. A response whose
    /// validation is not `VALID` is a failure even with a success status.
    pub async fn generate_workbook_summary(&self, workbook_key: &str) -> Result<()> {
        if workbook_key.is_empty() {
            return Err(FoundryError::InvalidArgument(
                "workbook primary key cannot be empty".to_string(),
            ));
        }
        info!(workbook = workbook_key, "Generating workbook summary");

        let mut parameters = Parameters::new();
        parameters.insert("excelWorkbook".into(), json!(workbook_key));
        let (response, body) = match self
            .apply(GENERATE_WORKBOOK_SUMMARY, parameters, ApplyMode::ValidateAndExecute)
            .await
        {
            Ok(ok) => ok,
            Err(e) => {
                if let FoundryError::Status { body, .. } = &e {
                    if body.contains("Logic function not executable") {
                        error!(
                            "The workbook summary logic function is not executable; \
                             check that summary generation is enabled for this ontology"
                        );
                    }
                }
                return Err(e);
            }
        };

        if !response.is_valid() {
            error!(
                result = response.validation_result().unwrap_or("none"),
                "Summary generation validation failed"
            );
            return Err(FoundryError::ValidationFailed {
                action: GENERATE_WORKBOOK_SUMMARY.to_string(),
                body,
            });
        }

        info!("Workbook summary generated");
        Ok(())
    }

    /// Whether the ontology endpoint answers with a success status.
    pub async fn check_connection(&self) -> bool {
        match self.transport.get(&self.ontology_url()).await {
            Ok(response) => {
                let ok = response.is_success();
                if !ok {
                    warn!(status = response.status, "Ontology check returned an error status");
                }
                ok
            }
            Err(e) => {
                warn!(error = %e, "Ontology unreachable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_plan_field() {
        assert_eq!(
            agent_plan_field(r#"{"agentPlan":"1. Do it"}"#).as_deref(),
            Some("1. Do it")
        );
        assert_eq!(agent_plan_field(r#"{"agentPlan":"  "}"#), None);
        assert_eq!(agent_plan_field(r#"{"agentPlan":null}"#), None);
        assert_eq!(agent_plan_field(r#"{"workbookName":"x"}"#), None);
        assert_eq!(agent_plan_field("garbage"), None);
    }

    #[test]
    fn test_urls() {
        let client = FoundryClient::connect(
            FoundryConfig {
                base_url: "https://stack.example.com/api/".into(),
                ontology_id: "ontology-1".into(),
                ..Default::default()
            },
            "token",
        );
        assert_eq!(
            client.action_url(CREATE_EXCEL_CELL, true),
            "https://stack.example.com/api/v2/ontologies/ontology-1/actions/create-excel-cell/applyBatch"
        );
        assert_eq!(
            client.query_url(PLAN_STEPS_QUERY),
            "https://stack.example.com/api/v2/ontologies/ontology-1/queries/genieForExcelPlanSteps/execute"
        );
    }

    #[test]
    fn test_query_timeout_detection() {
        let status = |body: &str| FoundryError::Status {
            action: PLAN_STEPS_QUERY.into(),
            status: 500,
            body: body.into(),
        };
        assert!(status(r#"{"errorName":"QueryTimeExceededLimit"}"#).is_query_timeout());
        assert!(status(r#"{"errorCode":"TIMEOUT"}"#).is_query_timeout());
        assert!(!status(r#"{"errorCode":"PERMISSION_DENIED"}"#).is_query_timeout());
        assert!(!FoundryError::Cancelled.is_query_timeout());
    }
}
