//! Archive extraction worker.
//!
//! The [`ExtractTask`] owns a boxed [`Archiver`] and processes submitted
//! files one at a time on a dedicated thread. It publishes a per-file status
//! snapshot (extracting / done / failed, with progress) and a drain of names
//! that just finished successfully, which the controller folds into its
//! persisted extracted set.
//!
//! An extraction error fails that file's job, not the worker.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::ModelFile;

/// Per-file extraction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractState {
    Extracting,
    Done,
    Failed,
}

/// Status of one submitted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractStatus {
    pub name: String,
    pub state: ExtractState,
    /// Percent complete, while extracting.
    pub progress: Option<u8>,
}

/// Performs the actual archive extraction for one file.
///
/// Implementations are supplied by the embedding application. Progress is
/// reported as a percentage through the callback.
pub trait Archiver: Send + 'static {
    fn extract(&mut self, file: &ModelFile, progress: &mut dyn FnMut(u8)) -> anyhow::Result<()>;
}

enum ExtractJob {
    Extract(Box<ModelFile>),
    Shutdown,
}

#[derive(Default)]
struct ExtractShared {
    statuses: Mutex<BTreeMap<String, ExtractStatus>>,
    dirty: AtomicBool,
    completed: Mutex<Vec<String>>,
}

impl ExtractShared {
    fn put_status(&self, name: &str, state: ExtractState, progress: Option<u8>) {
        self.statuses.lock().insert(
            name.to_string(),
            ExtractStatus {
                name: name.to_string(),
                state,
                progress,
            },
        );
        self.dirty.store(true, Ordering::SeqCst);
    }
}

/// Thread harness for the extractor.
pub struct ExtractTask {
    archiver: Option<Box<dyn Archiver>>,
    job_tx: Option<Sender<ExtractJob>>,
    shared: Arc<ExtractShared>,
    handle: Option<JoinHandle<()>>,
}

impl ExtractTask {
    pub fn new(archiver: Box<dyn Archiver>) -> Self {
        Self {
            archiver: Some(archiver),
            job_tx: None,
            shared: Arc::new(ExtractShared::default()),
            handle: None,
        }
    }

    /// Launch the worker thread.
    pub fn start(&mut self) {
        let Some(archiver) = self.archiver.take() else {
            return;
        };
        let (job_tx, job_rx) = unbounded();
        let shared = Arc::clone(&self.shared);
        self.job_tx = Some(job_tx);
        self.handle = Some(std::thread::spawn(move || run(archiver, &job_rx, &shared)));
        debug!("extract worker started");
    }

    /// Submit a file for extraction.
    pub fn submit(&self, file: &ModelFile) -> anyhow::Result<()> {
        let Some(tx) = &self.job_tx else {
            anyhow::bail!("extract worker is not running");
        };
        tx.send(ExtractJob::Extract(Box::new(file.clone())))
            .map_err(|_| anyhow::anyhow!("extract worker is gone"))
    }

    /// Take the status snapshot, if it changed since the last pop.
    pub fn pop_latest_statuses(&self) -> Option<Vec<ExtractStatus>> {
        if !self.shared.dirty.swap(false, Ordering::SeqCst) {
            return None;
        }
        Some(self.shared.statuses.lock().values().cloned().collect())
    }

    /// Drain the names that finished successfully since the last call.
    pub fn pop_completed(&self) -> Vec<String> {
        std::mem::take(&mut *self.shared.completed.lock())
    }

    /// Surface a worker failure in the supervisor's thread.
    pub fn propagate_error(&mut self) -> anyhow::Result<()> {
        if let Some(handle) = &self.handle
            && handle.is_finished()
        {
            return Err(anyhow::anyhow!("extract worker thread exited unexpectedly"));
        }
        Ok(())
    }

    /// Request shutdown and join the worker thread.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.job_tx.take() {
            let _ = tx.send(ExtractJob::Shutdown);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        debug!("extract worker stopped");
    }
}

fn run(mut archiver: Box<dyn Archiver>, job_rx: &Receiver<ExtractJob>, shared: &ExtractShared) {
    while let Ok(job) = job_rx.recv() {
        let file = match job {
            ExtractJob::Extract(file) => file,
            ExtractJob::Shutdown => break,
        };
        let name = file.name.clone();
        info!(file = %name, "extracting");
        shared.put_status(&name, ExtractState::Extracting, Some(0));

        let result = archiver.extract(&file, &mut |pct| {
            shared.put_status(&name, ExtractState::Extracting, Some(pct.min(100)));
        });
        match result {
            Ok(()) => {
                shared.put_status(&name, ExtractState::Done, Some(100));
                shared.completed.lock().push(name.clone());
                info!(file = %name, "extraction finished");
            }
            Err(err) => {
                shared.put_status(&name, ExtractState::Failed, None);
                warn!(file = %name, error = %err, "extraction failed");
            }
        }
    }
}
