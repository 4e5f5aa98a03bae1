//! Coordination core for a remote-to-local file synchronization appliance.
//!
//! seedferry drives a remote transfer engine, three directory scanners
//! (remote, local, and in-flight "active"), and a post-download archive
//! extractor, folding their observations into one authoritative model of
//! files and their states. Clients — a web UI, an HTTP API — observe the
//! model through listeners and issue commands (queue, stop, extract,
//! delete-local, delete-remote) against it.
//!
//! # Architecture
//!
//! - **model**: the authoritative file map with listener fan-out and the
//!   diff engine that feeds it.
//! - **controller**: the single-threaded reconciliation loop, the model
//!   builder, command dispatch, and the persisted download/extraction
//!   hints.
//! - **workers**: thread harnesses for the scanners, the extractor, and
//!   one-shot delete workers; the concrete walks, codecs, and delete
//!   implementations come from the embedding application.
//! - **transfer**: the seam to the external transfer engine.
//!
//! The embedding application constructs a [`controller::Controller`] with
//! its collaborators, calls `start()`, then drives `process()` in a loop.
//! Other threads hold a [`controller::ControllerHandle`] to read the model,
//! subscribe atomically, and queue commands.

pub mod config;
pub mod controller;
pub mod logging;
pub mod model;
pub mod transfer;
pub mod workers;

pub use config::{Config, ConfigError};
pub use controller::{
    Action, Command, CommandCallback, Controller, ControllerError, ControllerHandle,
    ControllerPersist, ControllerStatus, ModelBuilder, Workers,
};
pub use model::{FileState, Model, ModelDiff, ModelError, ModelFile, ModelListener, diff_models};
pub use transfer::{TransferEngine, TransferError, TransferState, TransferStatus};
pub use workers::{
    Archiver, DeleteWorkerFactory, ExtractState, ExtractStatus, FileRecord, ScanResult, Scanner,
};
