//! One-shot command workers.
//!
//! Delete actions run as single-purpose worker threads tracked by the
//! controller: spawned at dispatch, reaped on a later tick once no longer
//! alive. The actual delete implementations (local filesystem, remote over
//! the wire) are supplied by the embedding application through a
//! [`DeleteWorkerFactory`]; jobs must be idempotent — a target that is
//! already gone completes successfully.

use std::thread::JoinHandle;

use tracing::debug;

/// The work a one-shot worker performs.
pub type Job = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// Builds delete jobs, capturing connection parameters and roots at
/// construction time.
pub trait DeleteWorkerFactory: Send {
    fn delete_local(&self, name: &str) -> Job;
    fn delete_remote(&self, name: &str) -> Job;
}

/// A spawned one-shot worker thread.
pub struct OneShotTask {
    label: String,
    handle: Option<JoinHandle<anyhow::Result<()>>>,
}

impl OneShotTask {
    pub fn spawn(label: impl Into<String>, job: Job) -> Self {
        let label = label.into();
        debug!(worker = %label, "spawning one-shot worker");
        let handle = std::thread::spawn(job);
        Self {
            label,
            handle: Some(handle),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Join the worker and surface its failure, if any.
    ///
    /// A panicked worker counts as a failure.
    pub fn join(mut self) -> anyhow::Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("{} worker panicked", self.label)),
        }
    }
}
