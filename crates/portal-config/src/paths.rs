//! File system paths for portal binaries.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths under the portal base directory.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.member-portal)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a Paths instance rooted at `~/.member-portal`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".member-portal"),
        })
    }

    /// Create a Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Config file path (~/.member-portal/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// JSONL log file (~/.member-portal/logs/portal.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("portal.jsonl")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.base_dir.join("sessions")
    }

    /// Persisted session store for one realm (~/.member-portal/sessions/<realm>.json).
    pub fn session_store_file(&self, realm: &str) -> PathBuf {
        self.sessions_dir().join(format!("{}.json", realm))
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.sessions_dir())?;
        Ok(())
    }
}
