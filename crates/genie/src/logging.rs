//! Tracing setup: stderr output plus the blackbox session log.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{GenieError, Result};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "genie=info";
const VERBOSE_FILTER: &str = "genie=debug";

/// A per-session log file named after the time the session started.
#[derive(Debug)]
pub struct BlackboxLog {
    path: PathBuf,
    file: File,
}

impl BlackboxLog {
    /// Create `blackbox_<yyyyMMdd_HHmmss>.log` in `folder` and write the
    /// session header.
    pub fn create(folder: &Path) -> Result<Self> {
        fs::create_dir_all(folder)?;
        let now = Local::now();
        let name = format!("blackbox_{}.log", now.format("%Y%m%d_%H%M%S"));
        let path = folder.join(&name);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        writeln!(
            file,
            "=== Log Session Started at {} ===",
            now.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(file, "Log File: {name}")?;
        writeln!(file, "{}", "=".repeat(50))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init(verbose: bool, blackbox: Option<BlackboxLog>) -> Result<()> {
    let default = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let file = blackbox.map(|log| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(log.file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init()
        .map_err(|e| GenieError::Config(format!("logging already initialized: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blackbox_header() {
        let dir = tempfile::tempdir().unwrap();
        let log = BlackboxLog::create(&dir.path().join("Logs")).unwrap();

        let name = log.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("blackbox_") && name.ends_with(".log"));
        assert_eq!(name.len(), "blackbox_20240101_120000.log".len());

        let text = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert!(lines[0].starts_with("=== Log Session Started at "));
        assert_eq!(lines[1], format!("Log File: {name}"));
        assert_eq!(lines[2], "=".repeat(50));
    }
}
