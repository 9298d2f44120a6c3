//! Subprocess management and JSON IPC for the Excel bridge process.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use genie_protocol::{Command, Request, Response, ResponseData, ResponseResult};
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::host::ExcelHost;

const BRIDGE_EXE: &str = "genie-excel-bridge.exe";

/// Configuration for the Excel bridge process.
#[derive(Debug, Clone)]
pub struct ExcelBridgeConfig {
    /// Path to the `genie-excel-bridge.exe` Windows executable.
    /// If None, common locations relative to the current binary are searched.
    pub bridge_exe_path: Option<PathBuf>,

    /// WINE executable used to launch the bridge. `None` runs the bridge
    /// directly (native Windows).
    pub wine_path: Option<PathBuf>,

    /// Optional WINEPREFIX to use (for isolating the WINE environment).
    pub wine_prefix: Option<PathBuf>,
}

impl Default for ExcelBridgeConfig {
    fn default() -> Self {
        Self {
            bridge_exe_path: None,
            wine_path: if cfg!(windows) {
                None
            } else {
                Some(PathBuf::from("wine"))
            },
            wine_prefix: None,
        }
    }
}

/// Handle to a running bridge process.
///
/// Dropping the handle closes the bridge's stdin and waits for it to exit;
/// the bridge quits Excel when its input ends.
pub struct ExcelBridge {
    child: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<BufReader<ChildStdout>>,
    next_id: AtomicU64,
    under_wine: bool,
}

impl ExcelBridge {
    /// Spawn the bridge process without initializing Excel.
    pub fn spawn(config: ExcelBridgeConfig) -> Result<Self, BridgeError> {
        let exe_path = config.bridge_exe_path.unwrap_or_else(find_bridge_exe);

        if !exe_path.exists() {
            return Err(BridgeError::BridgeExeNotFound(
                exe_path.display().to_string(),
            ));
        }

        let mut cmd = match &config.wine_path {
            Some(wine) => {
                let mut cmd = std::process::Command::new(wine);
                if let Some(prefix) = &config.wine_prefix {
                    cmd.env("WINEPREFIX", prefix);
                }
                cmd.arg(&exe_path);
                cmd
            }
            None => std::process::Command::new(&exe_path),
        };
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit()); // Bridge diagnostics go to our stderr

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound && config.wine_path.is_some() {
                BridgeError::WineNotFound
            } else {
                BridgeError::SpawnFailed(e)
            }
        })?;

        let stdin = child.stdin.take().ok_or(BridgeError::NotRunning)?;
        let stdout = child.stdout.take().ok_or(BridgeError::NotRunning)?;

        info!(exe = %exe_path.display(), wine = config.wine_path.is_some(), "bridge process started");

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(BufReader::new(stdout)),
            next_id: AtomicU64::new(1),
            under_wine: config.wine_path.is_some(),
        })
    }

    /// Spawn the bridge process and initialize Excel.
    pub fn start(config: ExcelBridgeConfig) -> Result<Self, BridgeError> {
        let bridge = Self::spawn(config)?;
        bridge.send_command(Command::Init)?;
        Ok(bridge)
    }

    /// Send a command to the bridge and wait for the response.
    fn send_command(&self, command: Command) -> Result<Option<ResponseData>, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let request = Request { id, command };
        let json = serde_json::to_string(&request)?;
        debug!(id, request = %truncate(&json, 512), "bridge request");

        {
            let mut guard = self.stdin.lock().map_err(|_| BridgeError::NotRunning)?;
            let stdin = guard.as_mut().ok_or(BridgeError::NotRunning)?;
            writeln!(stdin, "{json}").map_err(|e| BridgeError::SendFailed(e.to_string()))?;
            stdin
                .flush()
                .map_err(|e| BridgeError::SendFailed(e.to_string()))?;
        }

        let response: Response = {
            let mut stdout = self.stdout.lock().map_err(|_| BridgeError::NotRunning)?;
            let mut line = String::new();
            stdout
                .read_line(&mut line)
                .map_err(|e| BridgeError::ReadFailed(e.to_string()))?;

            if line.is_empty() {
                return Err(BridgeError::NotRunning);
            }

            serde_json::from_str(&line)?
        };

        if response.id != id && response.id != 0 {
            warn!(expected = id, got = response.id, "bridge response id mismatch");
        }

        match response.result {
            ResponseResult::Ok { data } => Ok(data),
            ResponseResult::Error { message } => Err(BridgeError::Remote(message)),
        }
    }
}

impl ExcelHost for ExcelBridge {
    fn send(&self, command: Command) -> Result<Option<ResponseData>, BridgeError> {
        self.send_command(command)
    }

    fn host_path(&self, path: &Path) -> String {
        if self.under_wine {
            linux_to_wine_path(path)
        } else {
            path.display().to_string()
        }
    }
}

impl Drop for ExcelBridge {
    fn drop(&mut self) {
        if let Ok(mut stdin) = self.stdin.lock() {
            stdin.take();
        }
        if let Ok(mut child) = self.child.lock() {
            let _ = child.wait();
        }
    }
}

/// Convert a Linux filesystem path to a WINE (Windows) path.
///
/// WINE maps `/` to `Z:\`, so `/home/user/file.xlsx` becomes `Z:\home\user\file.xlsx`.
pub fn linux_to_wine_path(linux_path: &Path) -> String {
    let abs = if linux_path.is_absolute() {
        linux_path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(linux_path)
    };

    format!("Z:{}", abs.display()).replace('/', "\\")
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Attempt to locate the bridge exe relative to the current executable or in common paths.
fn find_bridge_exe() -> PathBuf {
    if let Ok(mut exe) = std::env::current_exe() {
        exe.pop();
        let candidate = exe.join(BRIDGE_EXE);
        if candidate.exists() {
            return candidate;
        }
    }

    for profile in ["release", "debug"] {
        let target_path =
            PathBuf::from(format!("target/x86_64-pc-windows-gnu/{profile}/{BRIDGE_EXE}"));
        if target_path.exists() {
            return target_path;
        }
    }

    PathBuf::from(BRIDGE_EXE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_to_wine_path() {
        assert_eq!(
            linux_to_wine_path(Path::new("/home/user/Budget.xlsx")),
            "Z:\\home\\user\\Budget.xlsx"
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn test_missing_exe_is_reported() {
        let config = ExcelBridgeConfig {
            bridge_exe_path: Some(PathBuf::from("/definitely/not/here/genie-excel-bridge.exe")),
            ..Default::default()
        };
        match ExcelBridge::spawn(config) {
            Err(BridgeError::BridgeExeNotFound(path)) => assert!(path.contains("not/here")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("spawn should fail"),
        }
    }
}
