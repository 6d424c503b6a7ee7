//! Configuration values.
//!
//! [`EngineConfig`] is handed to the engine explicitly. [`RecentArchives`]
//! belongs to the presentation layer; the engine never reads or writes it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{IoResultExt, Result};

/// Engine tuning, fixed for the engine's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// zlib level used when writing members, 0 (store) through 9.
    pub compression_level: u32,
    /// How often a foreground loop should poll an operation's progress.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            compression_level: 6,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Most-recently-opened archives, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentArchives {
    #[serde(rename = "recent_files", default)]
    paths: Vec<PathBuf>,
}

impl RecentArchives {
    pub const CAPACITY: usize = 5;

    /// Load from `path`. A missing or unreadable file, or one that is not
    /// valid JSON, yields an empty list.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "cannot read recent archives");
                }
                return Self::default();
            }
        };
        match serde_json::from_str::<Self>(&text) {
            Ok(mut recent) => {
                recent.paths.truncate(Self::CAPACITY);
                recent
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt recent archives file");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other).with_path(path)?;
        std::fs::write(path, json).with_path(path)
    }

    /// Move `archive` to the front, dropping older duplicates and anything
    /// past [`CAPACITY`](Self::CAPACITY).
    pub fn touch(&mut self, archive: &Path) {
        self.paths.retain(|p| p != archive);
        self.paths.insert(0, archive.to_path_buf());
        self.paths.truncate(Self::CAPACITY);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
