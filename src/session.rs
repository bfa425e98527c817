use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::accumulator::ProfileSet;
use crate::errors::AppError;
use crate::ingestion::{extract_profiles, Profile, RawDocument};
use crate::snapshot::SessionSnapshot;

const UPLOAD_ID_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploading,
    Completed,
    Error,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadStatus::Uploading)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub status: UploadStatus,
    pub progress: u8,
    #[serde(default)]
    pub records: Option<usize>,
    #[serde(default)]
    pub new_records: Option<usize>,
}

/// Messages posted by ingestion timelines to the state owner.
#[derive(Debug)]
pub enum IngestEvent {
    Progress { id: String, progress: u8 },
    Completed { id: String, document: RawDocument },
    Failed { id: String, error: AppError },
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeSummary {
    pub id: String,
    pub name: String,
    pub extracted: usize,
    pub new_identifiers: usize,
    pub added: usize,
    pub total_unique: usize,
}

#[derive(Debug)]
pub enum FileOutcome {
    Merged(MergeSummary),
    Rejected {
        id: String,
        name: String,
        error: AppError,
    },
    /// The record was removed or already finished; the result was dropped.
    Ignored { id: String },
}

/// Single owner of all session state. Events are applied one at a time, in
/// arrival order, so every merge is atomic with respect to other files.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    uploads: Vec<UploadRecord>,
    profiles: ProfileSet,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let profiles = ProfileSet::from_profiles(snapshot.global_profiles);
        if profiles.identifier_count() != snapshot.global_identifier_count {
            warn!(
                target: "session",
                restored = profiles.identifier_count(),
                recorded = snapshot.global_identifier_count,
                "snapshot identifier count differs from restored profiles"
            );
        }
        Self {
            uploads: snapshot.upload_records,
            profiles,
        }
    }

    /// Folds a restored snapshot into this state. Snapshot contents keep
    /// their original order; anything ingested since follows them.
    pub fn absorb_snapshot(self, snapshot: SessionSnapshot) -> Self {
        let mut restored = Self::from_snapshot(snapshot);
        for record in self.uploads {
            if restored.upload(&record.id).is_none() {
                restored.uploads.push(record);
            }
        }
        restored
            .profiles
            .merge(self.profiles.identifiers(), self.profiles.profiles());
        restored
    }

    /// Registers a new file and returns its opaque id.
    pub fn submit(&mut self, name: impl Into<String>, size: u64) -> String {
        let id = self.fresh_id();
        let name = name.into();
        debug!(target: "session", %id, %name, size, "upload registered");
        self.uploads.push(UploadRecord {
            id: id.clone(),
            name,
            size,
            status: UploadStatus::Uploading,
            progress: 0,
            records: None,
            new_records: None,
        });
        id
    }

    /// Removes the record. Profiles already merged from it stay.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.uploads.len();
        self.uploads.retain(|record| record.id != id);
        before != self.uploads.len()
    }

    pub fn apply(&mut self, event: IngestEvent) -> Option<FileOutcome> {
        match event {
            IngestEvent::Progress { id, progress } => {
                if let Some(record) = self.active_record(&id) {
                    record.progress = record.progress.max(progress.min(100));
                }
                None
            }
            IngestEvent::Completed { id, document } => Some(self.complete(id, document)),
            IngestEvent::Failed { id, error } => {
                let Some(record) = self.active_record(&id) else {
                    return Some(FileOutcome::Ignored { id });
                };
                record.status = UploadStatus::Error;
                let name = record.name.clone();
                warn!(target: "session", %id, %name, error = %error, "ingestion failed");
                Some(FileOutcome::Rejected { id, name, error })
            }
        }
    }

    fn complete(&mut self, id: String, document: RawDocument) -> FileOutcome {
        let Some(index) = self
            .uploads
            .iter()
            .position(|record| record.id == id && !record.status.is_terminal())
        else {
            debug!(target: "session", %id, "dropping result for inactive upload");
            return FileOutcome::Ignored { id };
        };

        match extract_profiles(&document, &self.profiles) {
            Ok(extraction) => {
                let added = self
                    .profiles
                    .merge(&extraction.identifiers, &extraction.profiles);
                let record = &mut self.uploads[index];
                record.status = UploadStatus::Completed;
                record.progress = 100;
                record.records = Some(extraction.profiles.len());
                record.new_records = Some(extraction.new_identifier_count);
                info!(
                    target: "session",
                    %id,
                    name = %record.name,
                    extracted = extraction.profiles.len(),
                    added,
                    total = self.profiles.identifier_count(),
                    "merged file into session"
                );
                FileOutcome::Merged(MergeSummary {
                    id,
                    name: record.name.clone(),
                    extracted: extraction.profiles.len(),
                    new_identifiers: extraction.new_identifier_count,
                    added,
                    total_unique: self.profiles.identifier_count(),
                })
            }
            Err(error) => {
                let record = &mut self.uploads[index];
                record.status = UploadStatus::Error;
                FileOutcome::Rejected {
                    id,
                    name: record.name.clone(),
                    error,
                }
            }
        }
    }

    fn active_record(&mut self, id: &str) -> Option<&mut UploadRecord> {
        self.uploads
            .iter_mut()
            .find(|record| record.id == id && !record.status.is_terminal())
    }

    fn fresh_id(&self) -> String {
        loop {
            let candidate: String = thread_rng()
                .sample_iter(&Alphanumeric)
                .take(UPLOAD_ID_LEN)
                .map(char::from)
                .collect::<String>()
                .to_lowercase();
            if !self.uploads.iter().any(|record| record.id == candidate) {
                return candidate;
            }
        }
    }

    pub fn uploads(&self) -> &[UploadRecord] {
        &self.uploads
    }

    pub fn upload(&self, id: &str) -> Option<&UploadRecord> {
        self.uploads.iter().find(|record| record.id == id)
    }

    pub fn profiles(&self) -> &[Profile] {
        self.profiles.profiles()
    }

    pub fn profile_set(&self) -> &ProfileSet {
        &self.profiles
    }

    pub fn unique_count(&self) -> usize {
        self.profiles.identifier_count()
    }
}
