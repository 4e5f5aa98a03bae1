//! The reducer that folds observations into a new model.
//!
//! Six inputs, each optional and sticky: remote listing, local listing,
//! active (in-flight) listing, transfer statuses, extract statuses, and the
//! two persisted name sets. A stream that produced nothing this tick keeps
//! its last observed value, so a scan that hasn't returned yet never makes
//! files flicker out of the model.
//!
//! State assignment per name, in priority order: a RUNNING transfer wins,
//! then a QUEUED one, then an in-flight extraction; otherwise local presence
//! combined with the persisted hints decides between EXTRACTED, DOWNLOADED
//! and DEFAULT, and a remotely-present file that was fetched before but is
//! locally gone is DELETED.
//!
//! The builder is also where a finished download is first discovered: a name
//! whose transfer status vanished while it was downloading becomes
//! DOWNLOADED once the local scan confirms the bytes arrived. The discovery
//! is remembered internally, and the controller folds it into the persisted
//! set when the transition reaches the model.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use tracing::{debug, trace};

use crate::model::{FileState, Model, ModelFile};
use crate::transfer::{TransferState, TransferStatus};
use crate::workers::extract::{ExtractState, ExtractStatus};
use crate::workers::scan::FileRecord;

#[derive(Default)]
pub struct ModelBuilder {
    remote_files: Option<BTreeMap<String, FileRecord>>,
    local_files: Option<BTreeMap<String, FileRecord>>,
    active_files: Option<BTreeMap<String, FileRecord>>,
    transfer_statuses: Option<Vec<TransferStatus>>,
    extract_statuses: Option<Vec<ExtractStatus>>,
    downloaded: HashSet<String>,
    extracted: HashSet<String>,
    /// Names whose last observed transfer activity was an in-flight
    /// download; kept until the download resolves or is requeued.
    pending_download: HashSet<String>,
}

fn by_name(files: Vec<FileRecord>) -> BTreeMap<String, FileRecord> {
    files.into_iter().map(|f| (f.name.clone(), f)).collect()
}

fn sizes_agree(remote: Option<&FileRecord>, local: Option<&FileRecord>) -> bool {
    match (remote.and_then(|r| r.size), local.and_then(|l| l.size)) {
        (Some(remote_size), Some(local_size)) => remote_size == local_size,
        _ => true,
    }
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_remote_files(&mut self, files: Vec<FileRecord>) {
        self.remote_files = Some(by_name(files));
    }

    pub fn set_local_files(&mut self, files: Vec<FileRecord>) {
        self.local_files = Some(by_name(files));
    }

    pub fn set_active_files(&mut self, files: Vec<FileRecord>) {
        self.active_files = Some(by_name(files));
    }

    pub fn set_transfer_statuses(&mut self, statuses: Vec<TransferStatus>) {
        self.transfer_statuses = Some(statuses);
    }

    pub fn set_extract_statuses(&mut self, statuses: Vec<ExtractStatus>) {
        self.extract_statuses = Some(statuses);
    }

    pub fn set_downloaded_files(&mut self, names: &HashSet<String>) {
        self.downloaded = names.clone();
    }

    pub fn set_extracted_files(&mut self, names: &HashSet<String>) {
        self.extracted = names.clone();
    }

    /// Fold the current inputs into a fresh model.
    pub fn build(&mut self) -> Model {
        let empty = BTreeMap::new();
        let remote = self.remote_files.as_ref().unwrap_or(&empty);
        let local = self.local_files.as_ref().unwrap_or(&empty);
        let active = self.active_files.as_ref().unwrap_or(&empty);

        // Last status wins per name.
        let mut transfer: BTreeMap<&str, &TransferStatus> = BTreeMap::new();
        for status in self.transfer_statuses.iter().flatten() {
            transfer.insert(&status.name, status);
        }
        let mut extract: BTreeMap<&str, &ExtractStatus> = BTreeMap::new();
        for status in self.extract_statuses.iter().flatten() {
            extract.insert(&status.name, status);
        }

        let mut names: BTreeSet<&str> = BTreeSet::new();
        names.extend(remote.keys().map(String::as_str));
        names.extend(local.keys().map(String::as_str));
        // In-flight jobs are visible even before either scan catches up.
        names.extend(transfer.values().filter_map(|s| match s.state {
            TransferState::Queued | TransferState::Running => Some(s.name.as_str()),
            TransferState::Done => None,
        }));
        names.extend(extract.values().filter_map(|s| match s.state {
            ExtractState::Extracting => Some(s.name.as_str()),
            ExtractState::Done | ExtractState::Failed => None,
        }));

        let files: Vec<ModelFile> = names
            .into_iter()
            .map(|name| {
                self.build_file(
                    name,
                    remote.get(name),
                    local.get(name),
                    active.get(name),
                    transfer.get(name).copied(),
                    extract.get(name).copied(),
                )
            })
            .collect();

        // Remember discoveries and in-flight downloads for the next build.
        let mut pending = HashSet::new();
        for file in &files {
            match file.state {
                FileState::Downloading => {
                    pending.insert(file.name.clone());
                }
                FileState::Downloaded => {
                    if !self.downloaded.contains(&file.name) {
                        debug!(file = %file.name, "download complete");
                        self.downloaded.insert(file.name.clone());
                    }
                }
                FileState::Queued
                | FileState::Extracting
                | FileState::Extracted => {}
                FileState::Default | FileState::Deleted => {
                    // An unresolved download keeps waiting for local
                    // evidence.
                    if self.pending_download.contains(&file.name) {
                        pending.insert(file.name.clone());
                    }
                }
            }
        }
        self.pending_download = pending;

        trace!(files = files.len(), "model rebuilt");
        Model::from_files(files)
    }

    fn build_file(
        &self,
        name: &str,
        remote: Option<&FileRecord>,
        local: Option<&FileRecord>,
        active: Option<&FileRecord>,
        transfer: Option<&TransferStatus>,
        extract: Option<&ExtractStatus>,
    ) -> ModelFile {
        let downloading = transfer.is_some_and(|s| s.state == TransferState::Running);
        let queued = transfer.is_some_and(|s| s.state == TransferState::Queued);
        let extracting = extract.is_some_and(|s| s.state == ExtractState::Extracting);
        let locally_present = local.is_some();
        let remotely_present = remote.is_some();
        let fetched_before = self.downloaded.contains(name) || self.extracted.contains(name);

        // A download is complete when the engine says so outright, or when
        // its status vanished and the local scan confirms the bytes arrived.
        let download_complete = transfer.is_some_and(|s| s.state == TransferState::Done)
            || (self.pending_download.contains(name)
                && transfer.is_none()
                && locally_present
                && sizes_agree(remote, local));

        let state = if downloading {
            FileState::Downloading
        } else if queued {
            FileState::Queued
        } else if extracting {
            FileState::Extracting
        } else if locally_present && self.extracted.contains(name) {
            FileState::Extracted
        } else if download_complete || (locally_present && self.downloaded.contains(name)) {
            FileState::Downloaded
        } else if remotely_present && !locally_present && fetched_before {
            FileState::Deleted
        } else {
            FileState::Default
        };

        // The active scan supplies fast in-flight sizes; outside of an
        // in-flight state the regular local scan is authoritative.
        let local_side = if downloading || extracting {
            active.or(local)
        } else {
            local
        };

        let is_dir = remote.or(local_side).is_some_and(|r| r.is_dir);
        let mut file = ModelFile::new(name, is_dir);
        file.state = state;
        file.remote_size = remote.and_then(|r| r.size);
        file.local_size = local_side.and_then(|r| r.size);
        if downloading {
            file.downloading_speed = transfer.and_then(|s| s.speed);
            file.eta = transfer.and_then(|s| s.eta);
        }
        if extracting {
            file.extract_progress = extract.and_then(|s| s.progress);
        }
        let parent = file.full_path.clone();
        file.children = merge_children(
            &parent,
            remote.map(|r| r.children.as_slice()).unwrap_or(&[]),
            local_side.map(|r| r.children.as_slice()).unwrap_or(&[]),
        );
        file
    }
}

fn merge_children(parent: &Path, remote: &[FileRecord], local: &[FileRecord]) -> Vec<ModelFile> {
    let remote: BTreeMap<&str, &FileRecord> =
        remote.iter().map(|r| (r.name.as_str(), r)).collect();
    let local: BTreeMap<&str, &FileRecord> = local.iter().map(|r| (r.name.as_str(), r)).collect();

    let names: BTreeSet<&str> = remote.keys().chain(local.keys()).copied().collect();
    names
        .into_iter()
        .map(|name| {
            let remote_rec = remote.get(name).copied();
            let local_rec = local.get(name).copied();
            let is_dir = remote_rec.or(local_rec).is_some_and(|r| r.is_dir);
            let mut child = ModelFile::new(name, is_dir);
            child.full_path = parent.join(name);
            child.remote_size = remote_rec.and_then(|r| r.size);
            child.local_size = local_rec.and_then(|r| r.size);
            child.children = merge_children(
                &child.full_path,
                remote_rec.map(|r| r.children.as_slice()).unwrap_or(&[]),
                local_rec.map(|r| r.children.as_slice()).unwrap_or(&[]),
            );
            child
        })
        .collect()
}
