//! The authoritative view of all known files and their states.
//!
//! The [`Model`] is a name-keyed map of [`ModelFile`]s with synchronous
//! listener fan-out. Every mutation fires the registered listeners before it
//! returns, so a listener that joins through a combined snapshot+subscribe
//! observes a linear, gap-free history of the model.
//!
//! All model access happens under the controller's model lock; the model
//! itself carries no locking.

pub mod diff;
pub mod types;

pub use diff::{ModelDiff, diff_models};
pub use types::{FileState, ModelFile};

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

/// Errors from model mutations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelError {
    #[error("File '{0}' not found")]
    NotFound(String),

    #[error("File '{0}' already exists")]
    AlreadyExists(String),
}

/// Receives model change events.
///
/// Callbacks run synchronously in the controller thread while the model lock
/// is held; implementations must not block. Hand off internally if richer
/// work is needed.
pub trait ModelListener: Send + Sync {
    fn file_added(&self, file: &ModelFile);
    fn file_removed(&self, file: &ModelFile);
    fn file_updated(&self, old: &ModelFile, new: &ModelFile);
}

/// Name → file map plus the registered listener set.
///
/// Files are kept in name order, which makes snapshots and diff emission
/// deterministic.
#[derive(Default)]
pub struct Model {
    files: BTreeMap<String, ModelFile>,
    listeners: Vec<Arc<dyn ModelListener>>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a model from a set of files without firing listeners.
    ///
    /// Used by the model builder for freshly computed models; last write
    /// wins on duplicate names.
    pub fn from_files(files: impl IntoIterator<Item = ModelFile>) -> Self {
        Self {
            files: files.into_iter().map(|f| (f.name.clone(), f)).collect(),
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ModelListener>) {
        self.listeners.push(listener);
    }

    /// Remove a listener by pointer identity.
    pub fn remove_listener(&mut self, listener: &Arc<dyn ModelListener>) {
        self.listeners
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn file(&self, name: &str) -> Option<&ModelFile> {
        self.files.get(name)
    }

    /// All file names, in ascending order.
    pub fn file_names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    /// A copy of every file, in name order.
    pub fn files(&self) -> Vec<ModelFile> {
        self.files.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Add a new file. The name must not already exist.
    pub fn add_file(&mut self, file: ModelFile) -> Result<(), ModelError> {
        if self.files.contains_key(&file.name) {
            return Err(ModelError::AlreadyExists(file.name));
        }
        trace!(file = %file.name, "model: file added");
        for listener in &self.listeners {
            listener.file_added(&file);
        }
        self.files.insert(file.name.clone(), file);
        Ok(())
    }

    /// Replace an existing file. The name must exist.
    pub fn update_file(&mut self, file: ModelFile) -> Result<(), ModelError> {
        let Some(old) = self.files.get(&file.name) else {
            return Err(ModelError::NotFound(file.name));
        };
        trace!(file = %file.name, "model: file updated");
        for listener in &self.listeners {
            listener.file_updated(old, &file);
        }
        self.files.insert(file.name.clone(), file);
        Ok(())
    }

    /// Remove a file by name, returning it.
    pub fn remove_file(&mut self, name: &str) -> Result<ModelFile, ModelError> {
        let Some(file) = self.files.remove(name) else {
            return Err(ModelError::NotFound(name.to_string()));
        };
        trace!(file = %name, "model: file removed");
        for listener in &self.listeners {
            listener.file_removed(&file);
        }
        Ok(file)
    }
}
