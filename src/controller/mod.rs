//! The reconciliation core.
//!
//! The [`Controller`] owns the model, the persisted hints, the command
//! queue, and every worker: three scanners, the extractor, the transfer
//! engine, and any in-flight one-shot delete workers. The caller drives it
//! by calling [`Controller::process`] in a loop; each tick propagates worker
//! failures, reaps finished delete workers, dispatches queued commands, and
//! rebuilds the model from the latest observations, publishing the diff to
//! listeners under the model lock.
//!
//! Clients on other threads interact through a cloneable
//! [`ControllerHandle`]: queueing commands, reading the model, and joining
//! the listener set atomically with a snapshot.

pub mod builder;
pub mod command;
pub mod persist;

pub use builder::ModelBuilder;
pub use command::{Action, Command, CommandCallback};
pub use persist::{ControllerPersist, PersistError};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::model::{FileState, Model, ModelDiff, ModelFile, ModelListener, diff_models};
use crate::transfer::{TransferEngine, TransferState};
use crate::workers::extract::{ExtractState, ExtractTask};
use crate::workers::oneshot::{DeleteWorkerFactory, OneShotTask};
use crate::workers::scan::{Scanner, ScannerTask};
use crate::workers::Archiver;

/// Fatal controller errors. Command failures never surface here; they go to
/// the command's callbacks.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Cannot process, controller is not started")]
    NotStarted,

    #[error("{worker} worker failed: {source}")]
    Worker {
        worker: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("transfer engine failed: {0}")]
    Transfer(#[from] crate::transfer::TransferError),
}

/// Scan freshness, updated at the end of each tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerStatus {
    pub latest_remote_scan_time: Option<DateTime<Utc>>,
    pub latest_local_scan_time: Option<DateTime<Utc>>,
}

/// The external collaborators the controller supervises.
pub struct Workers {
    pub transfer: Box<dyn TransferEngine>,
    pub remote_scanner: Box<dyn Scanner>,
    pub local_scanner: Box<dyn Scanner>,
    pub active_scanner: Box<dyn Scanner>,
    pub archiver: Box<dyn Archiver>,
    pub deleters: Box<dyn DeleteWorkerFactory>,
}

enum PostAction {
    RescanLocal,
    RescanRemote,
}

struct CommandTask {
    task: OneShotTask,
    post: PostAction,
}

/// Thread-safe client surface of a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    model: Arc<Mutex<Model>>,
    command_tx: Sender<Command>,
}

impl ControllerHandle {
    /// A copy of every model file.
    pub fn get_model_files(&self) -> Vec<ModelFile> {
        self.model.lock().files()
    }

    pub fn add_model_listener(&self, listener: Arc<dyn ModelListener>) {
        self.model.lock().add_listener(listener);
    }

    pub fn remove_model_listener(&self, listener: &Arc<dyn ModelListener>) {
        self.model.lock().remove_listener(listener);
    }

    /// Register a listener and snapshot the model in one critical section.
    ///
    /// The only safe way for a fresh client to join: snapshot-then-subscribe
    /// can miss intervening changes, subscribe-then-snapshot can duplicate
    /// them.
    pub fn subscribe_and_snapshot(&self, listener: Arc<dyn ModelListener>) -> Vec<ModelFile> {
        let mut model = self.model.lock();
        model.add_listener(listener);
        model.files()
    }

    /// Enqueue a command; it resolves on the next tick.
    pub fn queue_command(&self, command: Command) {
        let _ = self.command_tx.send(command);
    }
}

/// The coordination core. See the module docs.
pub struct Controller {
    model: Arc<Mutex<Model>>,
    builder: ModelBuilder,
    persist: ControllerPersist,
    persist_changed: bool,
    transfer: Box<dyn TransferEngine>,
    remote_scan: ScannerTask,
    local_scan: ScannerTask,
    active_scan: ScannerTask,
    extract: ExtractTask,
    deleters: Box<dyn DeleteWorkerFactory>,
    command_tx: Sender<Command>,
    command_rx: Receiver<Command>,
    active_commands: Vec<CommandTask>,
    active_downloading: Vec<String>,
    active_extracting: Vec<String>,
    status: ControllerStatus,
    started: bool,
}

impl Controller {
    pub fn new(config: &Config, persist: ControllerPersist, workers: Workers) -> Self {
        let mut builder = ModelBuilder::new();
        builder.set_downloaded_files(&persist.downloaded_file_names);
        builder.set_extracted_files(&persist.extracted_file_names);

        let (command_tx, command_rx) = unbounded();
        Self {
            model: Arc::new(Mutex::new(Model::new())),
            builder,
            persist,
            persist_changed: false,
            transfer: workers.transfer,
            remote_scan: ScannerTask::new(
                "remote",
                workers.remote_scanner,
                config.remote_scan_interval(),
            ),
            local_scan: ScannerTask::new(
                "local",
                workers.local_scanner,
                config.local_scan_interval(),
            ),
            active_scan: ScannerTask::new(
                "active",
                workers.active_scanner,
                config.active_scan_interval(),
            ),
            extract: ExtractTask::new(workers.archiver),
            deleters: workers.deleters,
            command_tx,
            command_rx,
            active_commands: Vec::new(),
            active_downloading: Vec::new(),
            active_extracting: Vec::new(),
            status: ControllerStatus::default(),
            started: false,
        }
    }

    /// Launch all long-lived workers. Must precede [`Controller::process`].
    pub fn start(&mut self) -> Result<(), ControllerError> {
        debug!("starting controller");
        self.active_scan.start();
        self.local_scan.start();
        self.remote_scan.start();
        self.extract.start();
        self.started = true;
        Ok(())
    }

    /// Advance the controller by one tick.
    ///
    /// Returns promptly; the heavy lifting happens in the workers.
    pub fn process(&mut self) -> Result<(), ControllerError> {
        if !self.started {
            return Err(ControllerError::NotStarted);
        }
        self.propagate_exceptions()?;
        self.cleanup_commands()?;
        self.process_commands();
        self.update_model();
        Ok(())
    }

    /// Shut down the transfer engine, then terminate and join every worker.
    pub fn exit(&mut self) -> Result<(), ControllerError> {
        if !self.started {
            return Ok(());
        }
        debug!("exiting controller");
        self.transfer.exit()?;
        self.active_scan.shutdown();
        self.local_scan.shutdown();
        self.remote_scan.shutdown();
        self.extract.shutdown();
        self.started = false;
        info!("controller exited");
        Ok(())
    }

    /// A cloneable, thread-safe client surface.
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            model: Arc::clone(&self.model),
            command_tx: self.command_tx.clone(),
        }
    }

    pub fn get_model_files(&self) -> Vec<ModelFile> {
        self.model.lock().files()
    }

    pub fn add_model_listener(&self, listener: Arc<dyn ModelListener>) {
        self.model.lock().add_listener(listener);
    }

    pub fn remove_model_listener(&self, listener: &Arc<dyn ModelListener>) {
        self.model.lock().remove_listener(listener);
    }

    /// See [`ControllerHandle::subscribe_and_snapshot`].
    pub fn subscribe_and_snapshot(&self, listener: Arc<dyn ModelListener>) -> Vec<ModelFile> {
        let mut model = self.model.lock();
        model.add_listener(listener);
        model.files()
    }

    pub fn queue_command(&self, command: Command) {
        let _ = self.command_tx.send(command);
    }

    pub fn status(&self) -> ControllerStatus {
        self.status
    }

    pub fn persist(&self) -> &ControllerPersist {
        &self.persist
    }

    /// True once per change to the persisted sets; the owning application
    /// saves the persist file when this reports true.
    pub fn take_persist_changed(&mut self) -> bool {
        std::mem::take(&mut self.persist_changed)
    }

    fn propagate_exceptions(&mut self) -> Result<(), ControllerError> {
        self.transfer.check_pending_error()?;
        for (name, task) in [
            ("remote scanner", &mut self.remote_scan),
            ("local scanner", &mut self.local_scan),
            ("active scanner", &mut self.active_scan),
        ] {
            task.propagate_error().map_err(|source| ControllerError::Worker {
                worker: name.to_string(),
                source,
            })?;
        }
        self.extract
            .propagate_error()
            .map_err(|source| ControllerError::Worker {
                worker: "extract".to_string(),
                source,
            })?;
        Ok(())
    }

    fn cleanup_commands(&mut self) -> Result<(), ControllerError> {
        let (alive, finished): (Vec<_>, Vec<_>) = self
            .active_commands
            .drain(..)
            .partition(|entry| entry.task.is_alive());
        self.active_commands = alive;

        for entry in finished {
            // Post-callback first, then the worker's failure if any.
            match entry.post {
                PostAction::RescanLocal => self.local_scan.force_scan(),
                PostAction::RescanRemote => self.remote_scan.force_scan(),
            }
            let label = entry.task.label().to_string();
            entry.task.join().map_err(|source| ControllerError::Worker {
                worker: label,
                source,
            })?;
        }
        Ok(())
    }

    fn process_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            info!(action = %command.action, file = %command.filename, "received command");

            let file = self.model.lock().file(&command.filename).cloned();
            let result = match file {
                Some(file) => self.execute_command(&command, &file),
                None => Err(format!("File '{}' not found", command.filename)),
            };
            match result {
                Ok(()) => {
                    for callback in command.callbacks() {
                        callback.on_success();
                    }
                }
                Err(message) => {
                    warn!(file = %command.filename, "command failed: {message}");
                    for callback in command.callbacks() {
                        callback.on_failure(&message);
                    }
                }
            }
        }
    }

    fn execute_command(&mut self, command: &Command, file: &ModelFile) -> Result<(), String> {
        match command.action {
            Action::Queue => {
                if file.remote_size.is_none() {
                    return Err(format!("File '{}' does not exist remotely", file.name));
                }
                self.transfer
                    .queue(&file.name, file.is_dir)
                    .map_err(|err| format!("Transfer engine error: {err}"))
            }
            Action::Stop => {
                if !matches!(file.state, FileState::Downloading | FileState::Queued) {
                    return Err(format!("File '{}' is not Queued or Downloading", file.name));
                }
                self.transfer
                    .kill(&file.name)
                    .map_err(|err| format!("Transfer engine error: {err}"))
            }
            Action::Extract => {
                // The is-extractable flag is only a guess, so it is not
                // checked here.
                if !matches!(
                    file.state,
                    FileState::Default | FileState::Downloaded | FileState::Extracted
                ) {
                    return Err(format!(
                        "File '{}' in state {} cannot be extracted",
                        file.name, file.state
                    ));
                }
                if file.local_size.is_none() {
                    return Err(format!("File '{}' does not exist locally", file.name));
                }
                self.extract
                    .submit(file)
                    .map_err(|err| format!("Extractor error: {err}"))
            }
            Action::DeleteLocal => {
                if !matches!(
                    file.state,
                    FileState::Default | FileState::Downloaded | FileState::Extracted
                ) {
                    return Err(format!(
                        "Local file '{}' cannot be deleted in state {}",
                        file.name, file.state
                    ));
                }
                if file.local_size.is_none() {
                    return Err(format!("File '{}' does not exist locally", file.name));
                }
                let task = OneShotTask::spawn(
                    format!("local delete of '{}'", file.name),
                    self.deleters.delete_local(&file.name),
                );
                self.active_commands.push(CommandTask {
                    task,
                    post: PostAction::RescanLocal,
                });
                Ok(())
            }
            Action::DeleteRemote => {
                if !matches!(
                    file.state,
                    FileState::Default
                        | FileState::Downloaded
                        | FileState::Extracted
                        | FileState::Deleted
                ) {
                    return Err(format!(
                        "Remote file '{}' cannot be deleted in state {}",
                        file.name, file.state
                    ));
                }
                if file.remote_size.is_none() {
                    return Err(format!("File '{}' does not exist remotely", file.name));
                }
                let task = OneShotTask::spawn(
                    format!("remote delete of '{}'", file.name),
                    self.deleters.delete_remote(&file.name),
                );
                self.active_commands.push(CommandTask {
                    task,
                    post: PostAction::RescanRemote,
                });
                Ok(())
            }
        }
    }

    fn update_model(&mut self) {
        let latest_remote_scan = self.remote_scan.pop_latest_result();
        let latest_local_scan = self.local_scan.pop_latest_result();
        let latest_active_scan = self.active_scan.pop_latest_result();

        let transfer_statuses = match self.transfer.status() {
            Ok(statuses) => Some(statuses),
            Err(err) => {
                warn!(error = %err, "transfer engine status unavailable, skipping this tick");
                None
            }
        };

        let latest_extract_statuses = self.extract.pop_latest_statuses();
        let completed_extractions = self.extract.pop_completed();

        // Active name lists survive a tick whose stream produced nothing.
        if let Some(statuses) = &transfer_statuses {
            self.active_downloading = statuses
                .iter()
                .filter(|s| s.state == TransferState::Running)
                .map(|s| s.name.clone())
                .collect();
        }
        if let Some(statuses) = &latest_extract_statuses {
            self.active_extracting = statuses
                .iter()
                .filter(|s| s.state == ExtractState::Extracting)
                .map(|s| s.name.clone())
                .collect();
        }
        let watch_list: Vec<String> = self
            .active_downloading
            .iter()
            .chain(self.active_extracting.iter())
            .cloned()
            .collect();
        self.active_scan.set_active_files(watch_list);

        if let Some(scan) = &latest_remote_scan {
            self.builder.set_remote_files(scan.files.clone());
        }
        if let Some(scan) = &latest_local_scan {
            self.builder.set_local_files(scan.files.clone());
        }
        if let Some(scan) = &latest_active_scan {
            self.builder.set_active_files(scan.files.clone());
        }
        if let Some(statuses) = transfer_statuses {
            self.builder.set_transfer_statuses(statuses);
        }
        if let Some(statuses) = latest_extract_statuses {
            self.builder.set_extract_statuses(statuses);
        }
        if !completed_extractions.is_empty() {
            for name in completed_extractions {
                self.persist.extracted_file_names.insert(name);
            }
            self.persist_changed = true;
            self.builder
                .set_extracted_files(&self.persist.extracted_file_names);
        }

        let new_model = self.builder.build();

        {
            let mut model = self.model.lock();
            let diffs = diff_models(&model, &new_model);
            for diff in diffs {
                let newly_downloaded = match &diff {
                    ModelDiff::Added(file) => file.state == FileState::Downloaded,
                    ModelDiff::Updated { old, new } => {
                        new.state == FileState::Downloaded && old.state != FileState::Downloaded
                    }
                    ModelDiff::Removed(_) => false,
                };
                let name = diff.name().to_string();
                let applied = match diff {
                    ModelDiff::Added(file) => model.add_file(file),
                    ModelDiff::Removed(file) => model.remove_file(&file.name).map(|_| ()),
                    ModelDiff::Updated { new, .. } => model.update_file(new),
                };
                if let Err(err) = applied {
                    warn!(file = %name, error = %err, "failed to apply model change");
                }
                if newly_downloaded {
                    self.persist.downloaded_file_names.insert(name);
                    self.persist_changed = true;
                    self.builder
                        .set_downloaded_files(&self.persist.downloaded_file_names);
                }
            }

            // A locally deleted file must not come back as EXTRACTED on a
            // re-download.
            let pruned: Vec<String> = self
                .persist
                .extracted_file_names
                .iter()
                .filter(|name| {
                    model
                        .file(name)
                        .is_some_and(|file| file.state == FileState::Deleted)
                })
                .cloned()
                .collect();
            if !pruned.is_empty() {
                info!(files = ?pruned, "removing locally deleted files from extracted set");
                for name in &pruned {
                    self.persist.extracted_file_names.remove(name);
                }
                self.persist_changed = true;
                self.builder
                    .set_extracted_files(&self.persist.extracted_file_names);
            }
        }

        if let Some(scan) = latest_remote_scan {
            self.status.latest_remote_scan_time = Some(scan.timestamp);
        }
        if let Some(scan) = latest_local_scan {
            self.status.latest_local_scan_time = Some(scan.timestamp);
        }
    }
}
