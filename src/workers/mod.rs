//! Worker thread harnesses supervised by the controller.
//!
//! Long-lived workers (the three scanners and the extractor) each own a
//! boxed implementation supplied by the embedding application and run it on
//! a dedicated thread. The controller talks to them exclusively through
//! non-blocking pops and control messages, and surfaces their failures at
//! the start of each tick. One-shot workers carry delete commands to
//! completion and are reaped when no longer alive.

pub mod extract;
pub mod oneshot;
pub mod scan;

pub use extract::{Archiver, ExtractState, ExtractStatus, ExtractTask};
pub use oneshot::{DeleteWorkerFactory, Job, OneShotTask};
pub use scan::{FileRecord, ScanResult, Scanner, ScannerTask};
