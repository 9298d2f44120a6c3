//! File locations, user settings and the TOML configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use genie_excel::{ExcelBridgeConfig, ExcelServiceConfig};
use genie_foundry::FoundryConfig;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{GenieError, Result};

/// Folder name used under the documents and config directories.
pub const APP_FOLDER: &str = "GenieForExcel";

/// Environment variable that overrides `[foundry] token`.
pub const TOKEN_ENV: &str = "FOUNDRY_TOKEN";

/// Where the application keeps its files.
#[derive(Debug, Clone, PartialEq)]
pub struct AppPaths {
    /// Undo snapshots, settings and custom instructions.
    pub genie_folder: PathBuf,
    pub logs_folder: PathBuf,
    pub settings_file: PathBuf,
    pub custom_instructions_file: PathBuf,
    pub recent_files_file: PathBuf,
    pub config_file: PathBuf,
}

impl AppPaths {
    /// Standard locations: `<documents>/GenieForExcel` for data and logs,
    /// `<config>/GenieForExcel` for the recent list and `genie.toml`.
    pub fn resolve() -> Result<Self> {
        let documents = dirs::document_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| GenieError::Config("cannot locate the documents folder".into()))?;
        let config = dirs::config_dir()
            .ok_or_else(|| GenieError::Config("cannot locate the config folder".into()))?;
        Ok(Self::split(
            documents.join(APP_FOLDER),
            config.join(APP_FOLDER),
        ))
    }

    /// Every path under `dir`.
    pub fn rooted(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::split(dir.to_path_buf(), dir.to_path_buf())
    }

    fn split(genie_folder: PathBuf, config_folder: PathBuf) -> Self {
        Self {
            logs_folder: genie_folder.join("Logs"),
            settings_file: genie_folder.join("settings.txt"),
            custom_instructions_file: genie_folder.join("customInstructions.txt"),
            recent_files_file: config_folder.join("recentFiles.txt"),
            config_file: config_folder.join("genie.toml"),
            genie_folder,
        }
    }
}

/// User settings kept as plain text files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub user_email: String,
    pub custom_instructions: String,
}

impl Settings {
    /// Missing files read as empty values.
    pub fn load(paths: &AppPaths) -> Result<Self> {
        Ok(Self {
            user_email: read_optional(&paths.settings_file)?.trim().to_string(),
            custom_instructions: read_optional(&paths.custom_instructions_file)?,
        })
    }

    pub fn save(&self, paths: &AppPaths) -> Result<()> {
        fs::create_dir_all(&paths.genie_folder)?;
        fs::write(&paths.settings_file, &self.user_email)?;
        fs::write(&paths.custom_instructions_file, &self.custom_instructions)?;
        info!("settings saved");
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

/// Contents of `genie.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenieConfig {
    pub foundry: FoundrySection,
    pub excel: ExcelSection,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FoundrySection {
    pub base_url: String,
    pub ontology_id: String,
    pub token: Option<String>,
    pub poll_interval_secs: u64,
    pub agent_plan_timeout_secs: u64,
    pub plan_steps_max_attempts: u32,
    pub cell_batch_size: usize,
}

impl Default for FoundrySection {
    fn default() -> Self {
        let defaults = FoundryConfig::default();
        Self {
            base_url: defaults.base_url,
            ontology_id: defaults.ontology_id,
            token: None,
            poll_interval_secs: defaults.poll_interval.as_secs(),
            agent_plan_timeout_secs: defaults.agent_plan_timeout.as_secs(),
            plan_steps_max_attempts: defaults.plan_steps_max_attempts,
            cell_batch_size: defaults.cell_batch_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExcelSection {
    pub bridge_exe: Option<PathBuf>,
    /// `None` keeps the platform default.
    pub wine_path: Option<PathBuf>,
    pub wine_prefix: Option<PathBuf>,
    pub settle_millis: u64,
}

impl Default for ExcelSection {
    fn default() -> Self {
        Self {
            bridge_exe: None,
            wine_path: None,
            wine_prefix: None,
            settle_millis: ExcelServiceConfig::default().settle.as_millis() as u64,
        }
    }
}

impl GenieConfig {
    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = read_optional(path)?;
        let config = Self::parse(&text)?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// The API token, preferring the environment over the file.
    pub fn token(&self) -> Result<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.foundry.token.clone())
            .ok_or_else(|| {
                GenieError::Config(format!(
                    "no Foundry token: set {TOKEN_ENV} or [foundry] token"
                ))
            })
    }

    pub fn foundry_config(&self) -> Result<FoundryConfig> {
        let f = &self.foundry;
        if f.base_url.trim().is_empty() || f.ontology_id.trim().is_empty() {
            return Err(GenieError::Config(
                "[foundry] base_url and ontology_id are required".into(),
            ));
        }
        Ok(FoundryConfig {
            base_url: f.base_url.trim_end_matches('/').to_string(),
            ontology_id: f.ontology_id.clone(),
            poll_interval: Duration::from_secs(f.poll_interval_secs),
            agent_plan_timeout: Duration::from_secs(f.agent_plan_timeout_secs),
            plan_steps_max_attempts: f.plan_steps_max_attempts,
            cell_batch_size: f.cell_batch_size,
        })
    }

    pub fn bridge_config(&self) -> ExcelBridgeConfig {
        let defaults = ExcelBridgeConfig::default();
        ExcelBridgeConfig {
            bridge_exe_path: self.excel.bridge_exe.clone(),
            wine_path: self.excel.wine_path.clone().or(defaults.wine_path),
            wine_prefix: self.excel.wine_prefix.clone(),
        }
    }

    pub fn service_config(&self) -> ExcelServiceConfig {
        ExcelServiceConfig {
            settle: Duration::from_millis(self.excel.settle_millis),
        }
    }
}
