//! Most-recently-used workbook list.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::error::Result;

/// Longest list kept on disk.
pub const MAX_RECENT_FILES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct RecentFile {
    pub name: String,
    pub full_path: PathBuf,
    pub last_accessed: Option<DateTime<Local>>,
}

impl RecentFile {
    fn from_path(path: &Path) -> Self {
        let last_accessed = fs::metadata(path)
            .and_then(|m| m.accessed())
            .ok()
            .map(DateTime::<Local>::from);
        Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            full_path: path.to_path_buf(),
            last_accessed,
        }
    }
}

/// MRU list persisted as one path per line. Entries whose file no longer
/// exists are dropped on load.
#[derive(Debug)]
pub struct RecentFiles {
    store: PathBuf,
    files: Vec<RecentFile>,
}

impl RecentFiles {
    /// Load the list from `store`. A missing or unreadable store is an
    /// empty list.
    pub fn load(store: impl Into<PathBuf>) -> Self {
        let store = store.into();
        let files = match fs::read_to_string(&store) {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(Path::new)
                .filter(|path| path.exists())
                .take(MAX_RECENT_FILES)
                .map(RecentFile::from_path)
                .collect(),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(store = %store.display(), error = %e, "error loading recent files");
                }
                Vec::new()
            }
        };
        debug!(count = files.len(), "recent files loaded");
        Self { store, files }
    }

    pub fn files(&self) -> &[RecentFile] {
        &self.files
    }

    /// Move `path` to the front of the list and persist.
    pub fn add(&mut self, path: &Path) -> Result<()> {
        self.files.retain(|f| f.full_path != path);
        self.files.insert(0, RecentFile::from_path(path));
        self.files.truncate(MAX_RECENT_FILES);
        self.save()
    }

    pub fn remove(&mut self, path: &Path) -> Result<()> {
        self.files.retain(|f| f.full_path != path);
        self.save()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.files.clear();
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.store.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut text = String::new();
        for file in &self.files {
            text.push_str(&file.full_path.to_string_lossy());
            text.push('\n');
        }
        fs::write(&self.store, text)?;
        Ok(())
    }
}
