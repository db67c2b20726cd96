//! Configuration and data directory management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Paths to all Observa data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Per-session scratch space (`data/temp/`): uploaded credentials, page caches.
    pub temp: PathBuf,
    /// Generated downloads (`data/exports/`).
    pub exports: PathBuf,
    /// LLM configuration (`data/llm-config.json`).
    pub llm_config_file: PathBuf,
    /// Custom prompt template (`data/prompt.txt`), used when present.
    pub prompt_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            temp: root.join("temp"),
            exports: root.join("exports"),
            llm_config_file: root.join("llm-config.json"),
            prompt_file: root.join("prompt.txt"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.temp)?;
        std::fs::create_dir_all(&self.exports)?;
        Ok(())
    }
}

/// Top-level Observa configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservaConfig {
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Upper bound on a single section's completion call, in seconds.
    /// `None` waits indefinitely.
    pub section_timeout_secs: Option<u64>,
}

impl ObservaConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let section_timeout_secs = std::env::var("OBSERVA_SECTION_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|secs: &u64| *secs > 0);

        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self {
            data_paths,
            section_timeout_secs,
        })
    }

    pub fn section_timeout(&self) -> Option<Duration> {
        self.section_timeout_secs.map(Duration::from_secs)
    }

    /// Custom prompt template from `prompt.txt`, if one exists and is readable.
    pub fn custom_prompt(&self) -> Option<String> {
        std::fs::read_to_string(&self.data_paths.prompt_file)
            .ok()
            .filter(|s| !s.trim().is_empty())
    }
}
