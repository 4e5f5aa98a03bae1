//! End-to-end controller scenarios against scripted collaborators.
//!
//! Every external seam (scanners, transfer engine, archiver, delete
//! workers) is backed by shared in-memory listings the tests mutate to
//! simulate the outside world; the controller is driven tick by tick with
//! bounded polling.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, unbounded};
use parking_lot::Mutex;

use seedferry::config::Config;
use seedferry::controller::{
    Action, Command, CommandCallback, Controller, ControllerError, ControllerPersist, Workers,
};
use seedferry::model::{FileState, ModelFile, ModelListener};
use seedferry::transfer::{TransferEngine, TransferError, TransferState, TransferStatus};
use seedferry::workers::oneshot::{DeleteWorkerFactory, Job};
use seedferry::workers::scan::{FileRecord, Scanner};
use seedferry::workers::Archiver;

const DEADLINE: Duration = Duration::from_secs(5);

type Listing = Arc<Mutex<Vec<FileRecord>>>;

struct ScriptedScanner {
    listing: Listing,
    fail: Arc<AtomicBool>,
    watch: Option<Arc<Mutex<Vec<String>>>>,
}

impl Scanner for ScriptedScanner {
    fn scan(&mut self) -> anyhow::Result<Vec<FileRecord>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("ssh connection lost");
        }
        Ok(self.listing.lock().clone())
    }

    fn set_active_files(&mut self, names: Vec<String>) {
        if let Some(watch) = &self.watch {
            *watch.lock() = names;
        }
    }
}

struct ScriptedTransfer {
    statuses: Arc<Mutex<Vec<TransferStatus>>>,
    queued: Arc<Mutex<Vec<(String, bool)>>>,
    killed: Arc<Mutex<Vec<String>>>,
    fail_status: Arc<AtomicBool>,
}

impl TransferEngine for ScriptedTransfer {
    fn queue(&mut self, name: &str, is_dir: bool) -> Result<(), TransferError> {
        self.queued.lock().push((name.to_string(), is_dir));
        Ok(())
    }

    fn kill(&mut self, name: &str) -> Result<(), TransferError> {
        self.killed.lock().push(name.to_string());
        Ok(())
    }

    fn status(&mut self) -> Result<Vec<TransferStatus>, TransferError> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(TransferError::new("status pipe broke"));
        }
        Ok(self.statuses.lock().clone())
    }

    fn exit(&mut self) -> Result<(), TransferError> {
        Ok(())
    }

    fn check_pending_error(&mut self) -> Result<(), TransferError> {
        Ok(())
    }
}

/// Extracts instantly, or blocks on a gate when one is provided.
struct ScriptedArchiver {
    gate: Option<Receiver<()>>,
}

impl Archiver for ScriptedArchiver {
    fn extract(&mut self, _file: &ModelFile, progress: &mut dyn FnMut(u8)) -> anyhow::Result<()> {
        progress(50);
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        Ok(())
    }
}

/// Delete jobs that edit the shared listings like the real workers would.
struct ListingDeleters {
    local: Listing,
    remote: Listing,
    fail: Arc<AtomicBool>,
}

impl DeleteWorkerFactory for ListingDeleters {
    fn delete_local(&self, name: &str) -> Job {
        let listing = self.local.clone();
        let fail = self.fail.clone();
        let name = name.to_string();
        Box::new(move || {
            if fail.load(Ordering::SeqCst) {
                anyhow::bail!("permission denied");
            }
            listing.lock().retain(|r| r.name != name);
            Ok(())
        })
    }

    fn delete_remote(&self, name: &str) -> Job {
        let listing = self.remote.clone();
        let fail = self.fail.clone();
        let name = name.to_string();
        Box::new(move || {
            if fail.load(Ordering::SeqCst) {
                anyhow::bail!("permission denied");
            }
            listing.lock().retain(|r| r.name != name);
            Ok(())
        })
    }
}

#[derive(Default)]
struct Recorder {
    successes: AtomicUsize,
    failures: Mutex<Vec<String>>,
}

impl CommandCallback for Recorder {
    fn on_success(&self) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_failure(&self, error: &str) {
        self.failures.lock().push(error.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Added(String, FileState),
    Removed(String),
    Updated(String, FileState, FileState),
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl ModelListener for EventLog {
    fn file_added(&self, file: &ModelFile) {
        self.events
            .lock()
            .push(Event::Added(file.name.clone(), file.state));
    }

    fn file_removed(&self, file: &ModelFile) {
        self.events.lock().push(Event::Removed(file.name.clone()));
    }

    fn file_updated(&self, old: &ModelFile, new: &ModelFile) {
        self.events
            .lock()
            .push(Event::Updated(new.name.clone(), old.state, new.state));
    }
}

impl EventLog {
    /// Distinct states observed for one file, in order.
    fn state_history(&self, name: &str) -> Vec<FileState> {
        let mut history: Vec<FileState> = Vec::new();
        for event in self.events.lock().iter() {
            let state = match event {
                Event::Added(n, state) if n == name => Some(*state),
                Event::Updated(n, _, state) if n == name => Some(*state),
                _ => None,
            };
            if let Some(state) = state
                && history.last() != Some(&state)
            {
                history.push(state);
            }
        }
        history
    }
}

struct Rig {
    controller: Controller,
    remote_listing: Listing,
    local_listing: Listing,
    statuses: Arc<Mutex<Vec<TransferStatus>>>,
    queued: Arc<Mutex<Vec<(String, bool)>>>,
    killed: Arc<Mutex<Vec<String>>>,
    fail_status: Arc<AtomicBool>,
    fail_remote_scan: Arc<AtomicBool>,
    fail_delete: Arc<AtomicBool>,
    watch: Arc<Mutex<Vec<String>>>,
}

fn rig_with(persist: ControllerPersist, gate: Option<Receiver<()>>) -> Rig {
    let remote_listing: Listing = Arc::new(Mutex::new(Vec::new()));
    let local_listing: Listing = Arc::new(Mutex::new(Vec::new()));
    let active_listing: Listing = Arc::new(Mutex::new(Vec::new()));
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let queued = Arc::new(Mutex::new(Vec::new()));
    let killed = Arc::new(Mutex::new(Vec::new()));
    let fail_status = Arc::new(AtomicBool::new(false));
    let fail_remote_scan = Arc::new(AtomicBool::new(false));
    let fail_delete = Arc::new(AtomicBool::new(false));
    let watch = Arc::new(Mutex::new(Vec::new()));

    let config = Config {
        remote_scan_interval_ms: 10,
        local_scan_interval_ms: 10,
        active_scan_interval_ms: 5,
    };
    let workers = Workers {
        transfer: Box::new(ScriptedTransfer {
            statuses: statuses.clone(),
            queued: queued.clone(),
            killed: killed.clone(),
            fail_status: fail_status.clone(),
        }),
        remote_scanner: Box::new(ScriptedScanner {
            listing: remote_listing.clone(),
            fail: fail_remote_scan.clone(),
            watch: None,
        }),
        local_scanner: Box::new(ScriptedScanner {
            listing: local_listing.clone(),
            fail: Arc::new(AtomicBool::new(false)),
            watch: None,
        }),
        active_scanner: Box::new(ScriptedScanner {
            listing: active_listing,
            fail: Arc::new(AtomicBool::new(false)),
            watch: Some(watch.clone()),
        }),
        archiver: Box::new(ScriptedArchiver { gate }),
        deleters: Box::new(ListingDeleters {
            local: local_listing.clone(),
            remote: remote_listing.clone(),
            fail: fail_delete.clone(),
        }),
    };

    Rig {
        controller: Controller::new(&config, persist, workers),
        remote_listing,
        local_listing,
        statuses,
        queued,
        killed,
        fail_status,
        fail_remote_scan,
        fail_delete,
        watch,
    }
}

fn rig(persist: ControllerPersist) -> Rig {
    rig_with(persist, None)
}

fn persist_with(downloaded: &[&str], extracted: &[&str]) -> ControllerPersist {
    ControllerPersist {
        downloaded_file_names: downloaded.iter().map(|n| n.to_string()).collect(),
        extracted_file_names: extracted.iter().map(|n| n.to_string()).collect(),
    }
}

/// Tick the controller until the predicate holds or the deadline passes.
fn tick_until(controller: &mut Controller, mut pred: impl FnMut(&Controller) -> bool) -> bool {
    let deadline = Instant::now() + DEADLINE;
    while Instant::now() < deadline {
        controller.process().expect("tick failed");
        if pred(controller) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(3));
    }
    false
}

/// Tick the controller until it returns an error or the deadline passes.
fn tick_until_error(controller: &mut Controller) -> Option<ControllerError> {
    let deadline = Instant::now() + DEADLINE;
    while Instant::now() < deadline {
        if let Err(err) = controller.process() {
            return Some(err);
        }
        std::thread::sleep(Duration::from_millis(3));
    }
    None
}

fn state_of(controller: &Controller, name: &str) -> Option<FileState> {
    controller
        .get_model_files()
        .into_iter()
        .find(|f| f.name == name)
        .map(|f| f.state)
}

fn queue_command(controller: &Controller, action: Action, name: &str) -> Arc<Recorder> {
    let recorder = Arc::new(Recorder::default());
    let mut command = Command::new(action, name);
    command.add_callback(recorder.clone());
    controller.queue_command(command);
    recorder
}

#[test]
fn happy_download_path() {
    let mut rig = rig(ControllerPersist::default());
    *rig.remote_listing.lock() = vec![FileRecord::file("A.iso", 100)];

    let log = Arc::new(EventLog::default());
    rig.controller.add_model_listener(log.clone());
    rig.controller.start().unwrap();

    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "A.iso") == Some(FileState::Default)
    }));

    let recorder = queue_command(&rig.controller, Action::Queue, "A.iso");
    assert!(tick_until(&mut rig.controller, |_| {
        recorder.successes.load(Ordering::SeqCst) == 1
    }));
    assert_eq!(*rig.queued.lock(), vec![("A.iso".to_string(), false)]);

    // The engine accepts the job and later starts it.
    *rig.statuses.lock() = vec![TransferStatus::new("A.iso", TransferState::Queued)];
    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "A.iso") == Some(FileState::Queued)
    }));

    let mut running = TransferStatus::new("A.iso", TransferState::Running);
    running.speed = Some(1_000_000);
    running.eta = Some(90);
    *rig.statuses.lock() = vec![running];
    assert!(tick_until(&mut rig.controller, |c| {
        c.get_model_files()
            .iter()
            .any(|f| f.name == "A.iso"
                && f.state == FileState::Downloading
                && f.downloading_speed == Some(1_000_000))
    }));

    // Bytes land, then the status goes away.
    *rig.local_listing.lock() = vec![FileRecord::file("A.iso", 100)];
    assert!(tick_until(&mut rig.controller, |c| {
        c.get_model_files()
            .iter()
            .any(|f| f.name == "A.iso" && f.local_size == Some(100))
    }));
    rig.statuses.lock().clear();
    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "A.iso") == Some(FileState::Downloaded)
    }));

    assert!(rig
        .controller
        .persist()
        .downloaded_file_names
        .contains("A.iso"));
    assert!(rig.controller.take_persist_changed());
    assert!(!rig.controller.take_persist_changed());

    assert_eq!(
        log.state_history("A.iso"),
        vec![
            FileState::Default,
            FileState::Queued,
            FileState::Downloading,
            FileState::Downloaded,
        ]
    );

    rig.controller.exit().unwrap();
}

#[test]
fn queue_unknown_file_fails() {
    let mut rig = rig(ControllerPersist::default());
    rig.controller.start().unwrap();

    let recorder = queue_command(&rig.controller, Action::Queue, "ghost");
    assert!(tick_until(&mut rig.controller, |_| {
        !recorder.failures.lock().is_empty()
    }));

    // A few more ticks must not re-notify.
    for _ in 0..5 {
        rig.controller.process().unwrap();
    }
    assert_eq!(*recorder.failures.lock(), vec!["File 'ghost' not found"]);
    assert_eq!(recorder.successes.load(Ordering::SeqCst), 0);

    rig.controller.exit().unwrap();
}

#[test]
fn stop_is_rejected_when_not_transferring() {
    let mut rig = rig(persist_with(&["A.iso"], &[]));
    *rig.remote_listing.lock() = vec![FileRecord::file("A.iso", 100)];
    *rig.local_listing.lock() = vec![FileRecord::file("A.iso", 100)];
    rig.controller.start().unwrap();

    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "A.iso") == Some(FileState::Downloaded)
    }));

    let recorder = queue_command(&rig.controller, Action::Stop, "A.iso");
    assert!(tick_until(&mut rig.controller, |_| {
        !recorder.failures.lock().is_empty()
    }));
    assert_eq!(
        *recorder.failures.lock(),
        vec!["File 'A.iso' is not Queued or Downloading"]
    );
    assert!(rig.killed.lock().is_empty());

    rig.controller.exit().unwrap();
}

#[test]
fn stop_kills_a_running_transfer() {
    let mut rig = rig(ControllerPersist::default());
    *rig.remote_listing.lock() = vec![FileRecord::file("A.iso", 100)];
    *rig.statuses.lock() = vec![TransferStatus::new("A.iso", TransferState::Running)];
    rig.controller.start().unwrap();

    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "A.iso") == Some(FileState::Downloading)
    }));

    let recorder = queue_command(&rig.controller, Action::Stop, "A.iso");
    assert!(tick_until(&mut rig.controller, |_| {
        recorder.successes.load(Ordering::SeqCst) == 1
    }));
    assert_eq!(*rig.killed.lock(), vec!["A.iso".to_string()]);

    rig.controller.exit().unwrap();
}

#[test]
fn extract_command_drives_extraction() {
    let (gate_tx, gate_rx) = unbounded();
    let mut rig = rig_with(persist_with(&["B.zip"], &[]), Some(gate_rx));
    *rig.remote_listing.lock() = vec![FileRecord::file("B.zip", 10)];
    *rig.local_listing.lock() = vec![FileRecord::file("B.zip", 10)];
    rig.controller.start().unwrap();

    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "B.zip") == Some(FileState::Downloaded)
    }));

    let recorder = queue_command(&rig.controller, Action::Extract, "B.zip");
    assert!(tick_until(&mut rig.controller, |_| {
        recorder.successes.load(Ordering::SeqCst) == 1
    }));

    // In-flight: visible with progress, and on the active watch list.
    assert!(tick_until(&mut rig.controller, |c| {
        c.get_model_files()
            .iter()
            .any(|f| f.name == "B.zip"
                && f.state == FileState::Extracting
                && f.extract_progress == Some(50))
    }));
    let watch = rig.watch.clone();
    assert!(tick_until(&mut rig.controller, |_| {
        watch.lock().contains(&"B.zip".to_string())
    }));

    gate_tx.send(()).unwrap();
    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "B.zip") == Some(FileState::Extracted)
    }));
    assert!(rig
        .controller
        .persist()
        .extracted_file_names
        .contains("B.zip"));

    rig.controller.exit().unwrap();
}

#[test]
fn extract_rejected_without_local_copy() {
    let mut rig = rig(ControllerPersist::default());
    *rig.remote_listing.lock() = vec![FileRecord::file("B.zip", 10)];
    rig.controller.start().unwrap();

    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "B.zip").is_some()
    }));

    let recorder = queue_command(&rig.controller, Action::Extract, "B.zip");
    assert!(tick_until(&mut rig.controller, |_| {
        !recorder.failures.lock().is_empty()
    }));
    assert_eq!(
        *recorder.failures.lock(),
        vec!["File 'B.zip' does not exist locally"]
    );

    rig.controller.exit().unwrap();
}

#[test]
fn delete_local_prunes_extracted_and_redownload_is_downloaded() {
    let mut rig = rig(persist_with(&["B.zip"], &["B.zip"]));
    *rig.remote_listing.lock() = vec![FileRecord::file("B.zip", 10)];
    *rig.local_listing.lock() = vec![FileRecord::file("B.zip", 10)];
    rig.controller.start().unwrap();

    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "B.zip") == Some(FileState::Extracted)
    }));

    let recorder = queue_command(&rig.controller, Action::DeleteLocal, "B.zip");
    assert!(tick_until(&mut rig.controller, |_| {
        recorder.successes.load(Ordering::SeqCst) == 1
    }));

    // The one-shot worker removes the local copy; the forced rescan brings
    // the model to DELETED and the extracted hint is dropped.
    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "B.zip") == Some(FileState::Deleted)
    }));
    assert!(tick_until(&mut rig.controller, |c| {
        !c.persist().extracted_file_names.contains("B.zip")
    }));
    // Still remembered as downloaded.
    assert!(rig
        .controller
        .persist()
        .downloaded_file_names
        .contains("B.zip"));

    // A re-download must come back DOWNLOADED, not EXTRACTED.
    *rig.local_listing.lock() = vec![FileRecord::file("B.zip", 10)];
    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "B.zip") == Some(FileState::Downloaded)
    }));

    rig.controller.exit().unwrap();
}

#[test]
fn delete_remote_removes_the_file() {
    let mut rig = rig(ControllerPersist::default());
    *rig.remote_listing.lock() = vec![FileRecord::file("old.iso", 100)];
    rig.controller.start().unwrap();

    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "old.iso") == Some(FileState::Default)
    }));

    let recorder = queue_command(&rig.controller, Action::DeleteRemote, "old.iso");
    assert!(tick_until(&mut rig.controller, |_| {
        recorder.successes.load(Ordering::SeqCst) == 1
    }));
    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "old.iso").is_none()
    }));

    rig.controller.exit().unwrap();
}

#[test]
fn transfer_status_outage_keeps_sticky_state() {
    let mut rig = rig(ControllerPersist::default());
    *rig.remote_listing.lock() = vec![FileRecord::file("A.iso", 100)];
    *rig.statuses.lock() = vec![TransferStatus::new("A.iso", TransferState::Running)];

    let log = Arc::new(EventLog::default());
    rig.controller.add_model_listener(log.clone());
    rig.controller.start().unwrap();

    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "A.iso") == Some(FileState::Downloading)
    }));

    rig.fail_status.store(true, Ordering::SeqCst);
    for _ in 0..10 {
        rig.controller.process().unwrap();
        std::thread::sleep(Duration::from_millis(3));
    }

    // No regression: the last good statuses keep driving the state.
    assert_eq!(state_of(&rig.controller, "A.iso"), Some(FileState::Downloading));
    // Depending on whether the first remote scan or the first status poll
    // won the race, the history is [Downloading] or [Default, Downloading];
    // either way nothing regressed during the outage.
    let history = log.state_history("A.iso");
    assert_eq!(history.last(), Some(&FileState::Downloading));
    assert!(history.len() <= 2);

    rig.controller.exit().unwrap();
}

#[test]
fn subscribe_and_snapshot_is_atomic() {
    let mut rig = rig(ControllerPersist::default());
    *rig.remote_listing.lock() = vec![FileRecord::file("C", 1)];
    rig.controller.start().unwrap();

    let log = Arc::new(EventLog::default());
    let handle = rig.controller.handle();
    let subscriber = {
        let log = log.clone();
        std::thread::spawn(move || {
            let snapshot = handle.subscribe_and_snapshot(log);
            snapshot.iter().any(|f| f.name == "C")
        })
    };

    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "C").is_some()
    }));
    let snapshot_had_c = subscriber.join().unwrap();

    // Let any in-flight events settle, then check the exclusive-or.
    rig.controller.process().unwrap();
    let added_c = log
        .events
        .lock()
        .iter()
        .filter(|e| matches!(e, Event::Added(name, _) if name == "C"))
        .count();
    if snapshot_had_c {
        assert_eq!(added_c, 0, "snapshot already contained C");
    } else {
        assert_eq!(added_c, 1, "snapshot lacked C, exactly one ADDED expected");
    }

    rig.controller.exit().unwrap();
}

#[test]
fn scanner_failure_is_fatal() {
    let mut rig = rig(ControllerPersist::default());
    rig.fail_remote_scan.store(true, Ordering::SeqCst);
    rig.controller.start().unwrap();

    let err = tick_until_error(&mut rig.controller).expect("worker failure expected");
    match err {
        ControllerError::Worker { worker, .. } => assert_eq!(worker, "remote scanner"),
        other => panic!("expected worker failure, got {other}"),
    }
}

#[test]
fn delete_worker_failure_is_fatal_after_post_callback() {
    let mut rig = rig(persist_with(&["B.zip"], &[]));
    *rig.remote_listing.lock() = vec![FileRecord::file("B.zip", 10)];
    *rig.local_listing.lock() = vec![FileRecord::file("B.zip", 10)];
    rig.fail_delete.store(true, Ordering::SeqCst);
    rig.controller.start().unwrap();

    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "B.zip") == Some(FileState::Downloaded)
    }));

    let recorder = queue_command(&rig.controller, Action::DeleteLocal, "B.zip");
    let err = tick_until_error(&mut rig.controller).expect("delete failure expected");
    assert!(matches!(err, ControllerError::Worker { .. }));
    // Spawning succeeded, so the command itself reported success.
    assert_eq!(recorder.successes.load(Ordering::SeqCst), 1);
}

#[test]
fn process_requires_start() {
    let mut rig = rig(ControllerPersist::default());
    let err = rig.controller.process().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot process, controller is not started"
    );
}

#[test]
fn handle_queues_commands_from_other_threads() {
    let mut rig = rig(ControllerPersist::default());
    *rig.remote_listing.lock() = vec![FileRecord::file("A.iso", 100)];
    rig.controller.start().unwrap();

    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "A.iso").is_some()
    }));

    let handle = rig.controller.handle();
    let recorder = Arc::new(Recorder::default());
    let queuer = {
        let recorder = recorder.clone();
        std::thread::spawn(move || {
            let mut command = Command::new(Action::Queue, "A.iso");
            command.add_callback(recorder);
            handle.queue_command(command);
        })
    };
    queuer.join().unwrap();

    assert!(tick_until(&mut rig.controller, |_| {
        recorder.successes.load(Ordering::SeqCst) == 1
    }));

    rig.controller.exit().unwrap();
}

#[test]
fn every_command_gets_exactly_one_terminal_callback() {
    let mut rig = rig(persist_with(&["A.iso"], &[]));
    *rig.remote_listing.lock() = vec![FileRecord::file("A.iso", 100)];
    *rig.local_listing.lock() = vec![FileRecord::file("A.iso", 100)];
    rig.controller.start().unwrap();

    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "A.iso") == Some(FileState::Downloaded)
    }));

    let recorders: Vec<(Arc<Recorder>, bool)> = vec![
        (queue_command(&rig.controller, Action::Queue, "A.iso"), true),
        (queue_command(&rig.controller, Action::Stop, "A.iso"), false),
        (queue_command(&rig.controller, Action::Queue, "missing"), false),
        (queue_command(&rig.controller, Action::Extract, "A.iso"), true),
    ];

    assert!(tick_until(&mut rig.controller, |_| {
        recorders.iter().all(|(r, expect_success)| {
            if *expect_success {
                r.successes.load(Ordering::SeqCst) == 1
            } else {
                r.failures.lock().len() == 1
            }
        })
    }));

    // Extra ticks must not duplicate any terminal notification.
    for _ in 0..5 {
        rig.controller.process().unwrap();
        std::thread::sleep(Duration::from_millis(3));
    }
    for (recorder, expect_success) in &recorders {
        let successes = recorder.successes.load(Ordering::SeqCst);
        let failures = recorder.failures.lock().len();
        assert_eq!(successes + failures, 1);
        assert_eq!(successes == 1, *expect_success);
    }

    rig.controller.exit().unwrap();
}

#[test]
fn snapshot_plus_events_reconstructs_the_model() {
    let mut rig = rig(ControllerPersist::default());
    *rig.remote_listing.lock() = vec![FileRecord::file("A.iso", 100)];
    rig.controller.start().unwrap();

    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "A.iso").is_some()
    }));

    let log = Arc::new(EventLog::default());
    let snapshot = rig.controller.subscribe_and_snapshot(log.clone());

    *rig.remote_listing.lock() = vec![
        FileRecord::file("A.iso", 100),
        FileRecord::file("B.iso", 200),
    ];
    assert!(tick_until(&mut rig.controller, |c| {
        state_of(c, "B.iso").is_some()
    }));

    // Replay the event log over the snapshot and compare against the model.
    let mut names: HashSet<String> = snapshot.into_iter().map(|f| f.name).collect();
    for event in log.events.lock().iter() {
        match event {
            Event::Added(name, _) => {
                assert!(names.insert(name.clone()), "duplicate add of {name}");
            }
            Event::Removed(name) => {
                assert!(names.remove(name), "remove of unknown {name}");
            }
            Event::Updated(name, _, _) => {
                assert!(names.contains(name), "update of unknown {name}");
            }
        }
    }
    let model_names: HashSet<String> = rig
        .controller
        .get_model_files()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(names, model_names);

    rig.controller.exit().unwrap();
}
