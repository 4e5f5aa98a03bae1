//! Seam to the external transfer engine.
//!
//! The engine wraps an external command-line transfer tool and runs its own
//! background machinery; the controller only queues and kills jobs and polls
//! per-job status once per tick. The concrete engine is supplied by the
//! embedding application as a boxed [`TransferEngine`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error kind for every engine interaction, carrying the engine's message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransferError(pub String);

impl TransferError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Per-job transfer state as the engine reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    Queued,
    Running,
    Done,
}

/// One in-flight (or just-finished) transfer job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStatus {
    pub name: String,
    pub state: TransferState,
    /// Bytes per second, when running.
    pub speed: Option<u64>,
    /// Seconds remaining, when running.
    pub eta: Option<u64>,
}

impl TransferStatus {
    pub fn new(name: impl Into<String>, state: TransferState) -> Self {
        Self {
            name: name.into(),
            state,
            speed: None,
            eta: None,
        }
    }
}

/// Interface of the external transfer engine.
///
/// `queue`/`kill` are synchronous and bounded; `status` may block briefly.
/// A failure that occurred in the engine's own background machinery is
/// surfaced through `check_pending_error` at the start of each tick.
pub trait TransferEngine: Send {
    /// Ask the engine to queue a download of `name`.
    fn queue(&mut self, name: &str, is_dir: bool) -> Result<(), TransferError>;

    /// Ask the engine to stop the job for `name`.
    fn kill(&mut self, name: &str) -> Result<(), TransferError>;

    /// Current status of all known jobs.
    fn status(&mut self) -> Result<Vec<TransferStatus>, TransferError>;

    /// Graceful shutdown; invoked before sibling workers are terminated.
    fn exit(&mut self) -> Result<(), TransferError>;

    /// Report a pending background failure, if any.
    fn check_pending_error(&mut self) -> Result<(), TransferError>;
}
