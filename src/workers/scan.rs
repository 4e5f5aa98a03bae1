//! Periodic scanner workers.
//!
//! A [`ScannerTask`] owns a boxed [`Scanner`] and runs it on a dedicated
//! thread at a fixed cadence, publishing each result into a latest-wins slot
//! that the controller drains non-blockingly once per tick. Control messages
//! (force-scan, watch-list updates, shutdown) ride a channel so producers
//! never touch the scanner itself.
//!
//! A scan error is a worker failure: the thread parks the error for the
//! supervisor and exits.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One entry of a directory listing.
///
/// `size` comes from finished files, or in-progress byte counts for active
/// scans. Directory records carry their children recursively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    pub is_dir: bool,
    pub size: Option<u64>,
    pub children: Vec<FileRecord>,
}

impl FileRecord {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            size: Some(size),
            children: Vec::new(),
        }
    }

    pub fn dir(name: impl Into<String>, children: Vec<FileRecord>) -> Self {
        let size = children.iter().map(|c| c.size.unwrap_or(0)).sum();
        Self {
            name: name.into(),
            is_dir: true,
            size: Some(size),
            children,
        }
    }
}

/// A completed scan: when it ran and what it saw.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub timestamp: DateTime<Utc>,
    pub files: Vec<FileRecord>,
}

/// A directory walk driven by a [`ScannerTask`].
///
/// Implementations are supplied by the embedding application (local walk,
/// SSH walk). `set_active_files` is only meaningful for the active scanner,
/// which restricts itself to a watch list; other scanners ignore it.
pub trait Scanner: Send + 'static {
    fn scan(&mut self) -> anyhow::Result<Vec<FileRecord>>;

    fn set_active_files(&mut self, names: Vec<String>) {
        let _ = names;
    }
}

enum ScanControl {
    ForceScan,
    SetActiveFiles(Vec<String>),
    Shutdown,
}

#[derive(Default)]
struct ScanShared {
    latest: Mutex<Option<ScanResult>>,
    error: Mutex<Option<anyhow::Error>>,
}

/// Thread harness for one scanner.
pub struct ScannerTask {
    label: &'static str,
    interval: Duration,
    scanner: Option<Box<dyn Scanner>>,
    control_tx: Option<Sender<ScanControl>>,
    shared: Arc<ScanShared>,
    handle: Option<JoinHandle<()>>,
}

impl ScannerTask {
    pub fn new(label: &'static str, scanner: Box<dyn Scanner>, interval: Duration) -> Self {
        Self {
            label,
            interval,
            scanner: Some(scanner),
            control_tx: None,
            shared: Arc::new(ScanShared::default()),
            handle: None,
        }
    }

    /// Launch the worker thread. The first scan runs immediately.
    pub fn start(&mut self) {
        let Some(scanner) = self.scanner.take() else {
            return;
        };
        let (control_tx, control_rx) = unbounded();
        let shared = Arc::clone(&self.shared);
        let label = self.label;
        let interval = self.interval;
        debug!(scanner = label, interval_ms = interval.as_millis() as u64, "starting scanner");
        self.control_tx = Some(control_tx);
        self.handle = Some(std::thread::spawn(move || {
            run(label, scanner, interval, &control_rx, &shared);
        }));
    }

    /// Take the most recent scan result, if a new one arrived.
    pub fn pop_latest_result(&self) -> Option<ScanResult> {
        self.shared.latest.lock().take()
    }

    /// Hint the worker to scan as soon as possible.
    pub fn force_scan(&self) {
        if let Some(tx) = &self.control_tx {
            let _ = tx.send(ScanControl::ForceScan);
        }
    }

    /// Replace the watch list of an active scanner.
    pub fn set_active_files(&self, names: Vec<String>) {
        if let Some(tx) = &self.control_tx {
            let _ = tx.send(ScanControl::SetActiveFiles(names));
        }
    }

    /// Surface a worker failure in the supervisor's thread.
    pub fn propagate_error(&mut self) -> anyhow::Result<()> {
        if let Some(err) = self.shared.error.lock().take() {
            return Err(err);
        }
        if let Some(handle) = &self.handle
            && handle.is_finished()
        {
            return Err(anyhow::anyhow!("{} scanner thread exited unexpectedly", self.label));
        }
        Ok(())
    }

    /// Request shutdown and join the worker thread.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.control_tx.take() {
            let _ = tx.send(ScanControl::Shutdown);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        debug!(scanner = self.label, "scanner stopped");
    }
}

fn run(
    label: &'static str,
    mut scanner: Box<dyn Scanner>,
    interval: Duration,
    control_rx: &Receiver<ScanControl>,
    shared: &ScanShared,
) {
    debug!(scanner = label, "scanner started");
    loop {
        match scanner.scan() {
            Ok(files) => {
                *shared.latest.lock() = Some(ScanResult {
                    timestamp: Utc::now(),
                    files,
                });
            }
            Err(err) => {
                warn!(scanner = label, error = %err, "scan failed");
                *shared.error.lock() = Some(err);
                return;
            }
        }

        // Wait out the cadence, servicing control messages as they arrive.
        let deadline = Instant::now() + interval;
        loop {
            match control_rx.recv_deadline(deadline) {
                Ok(ScanControl::ForceScan) | Err(RecvTimeoutError::Timeout) => break,
                Ok(ScanControl::SetActiveFiles(names)) => scanner.set_active_files(names),
                Ok(ScanControl::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}
