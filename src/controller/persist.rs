//! Durable download/extraction hints.
//!
//! Two name sets survive restarts: files ever observed to finish
//! downloading, and files ever extracted successfully. The model builder
//! uses them to tell DEFAULT apart from DOWNLOADED/EXTRACTED when only
//! local evidence is available. The controller mutates the sets in place
//! and flags the change; the embedding application owns the file and saves
//! it when flagged.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors when loading or saving the persist file.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to read persist file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse persist file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not determine data directory")]
    NoDataDir,
}

/// The persisted name sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerPersist {
    #[serde(default)]
    pub downloaded_file_names: HashSet<String>,

    #[serde(default)]
    pub extracted_file_names: HashSet<String>,
}

impl ControllerPersist {
    /// Load from a path; a missing file is an empty persist.
    pub fn load_from(path: &Path) -> Result<Self, PersistError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save to a path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), PersistError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default location, honoring `XDG_DATA_HOME`.
    pub fn default_path() -> Result<PathBuf, PersistError> {
        if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
            return Ok(PathBuf::from(xdg_data).join("seedferry").join("persist.json"));
        }
        dirs::data_dir()
            .map(|p| p.join("seedferry").join("persist.json"))
            .ok_or(PersistError::NoDataDir)
    }
}
