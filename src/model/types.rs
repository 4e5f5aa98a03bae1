//! Reconciled file entities.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle of a tracked file, derived from observations.
///
/// States are never set directly by clients; the model builder is the only
/// source of truth for state assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileState {
    Default,
    Queued,
    Downloading,
    Downloaded,
    Extracting,
    Extracted,
    Deleted,
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileState::Default => write!(f, "Default"),
            FileState::Queued => write!(f, "Queued"),
            FileState::Downloading => write!(f, "Downloading"),
            FileState::Downloaded => write!(f, "Downloaded"),
            FileState::Extracting => write!(f, "Extracting"),
            FileState::Extracted => write!(f, "Extracted"),
            FileState::Deleted => write!(f, "Deleted"),
        }
    }
}

/// One file or directory as the controller understands it.
///
/// `remote_size`/`local_size` of `None` mean "not observed on that side".
/// Directories own their children by value; children carry the same schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFile {
    pub name: String,
    pub is_dir: bool,
    pub state: FileState,
    /// Path relative to the sync root ("parent/child" for children).
    pub full_path: PathBuf,
    pub remote_size: Option<u64>,
    pub local_size: Option<u64>,
    /// Bytes per second, present while downloading.
    pub downloading_speed: Option<u64>,
    /// Seconds remaining, present while downloading.
    pub eta: Option<u64>,
    /// Percent complete, present while extracting.
    pub extract_progress: Option<u8>,
    pub children: Vec<ModelFile>,
}

impl ModelFile {
    pub fn new(name: impl Into<String>, is_dir: bool) -> Self {
        let name = name.into();
        let full_path = PathBuf::from(&name);
        Self {
            name,
            is_dir,
            state: FileState::Default,
            full_path,
            remote_size: None,
            local_size: None,
            downloading_speed: None,
            eta: None,
            extract_progress: None,
            children: Vec::new(),
        }
    }
}
