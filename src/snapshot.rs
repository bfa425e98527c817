use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::db::DurableStore;
use crate::errors::AppResult;
use crate::ingestion::Profile;
use crate::session::{SessionState, UploadRecord};

pub const SNAPSHOT_KEY: &str = "linkedin_extractor_session";

/// Snapshots at least this old are discarded instead of restored.
pub fn snapshot_max_age() -> Duration {
    Duration::hours(1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub upload_records: Vec<UploadRecord>,
    pub global_profiles: Vec<Profile>,
    pub global_identifier_count: usize,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl SessionSnapshot {
    pub fn capture(state: &SessionState, now: DateTime<Utc>) -> Self {
        Self {
            upload_records: state.uploads().to_vec(),
            global_profiles: state.profiles().to_vec(),
            global_identifier_count: state.unique_count(),
            timestamp: now.timestamp_millis(),
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() - self.timestamp >= snapshot_max_age().num_milliseconds()
    }
}

/// Holds at most one snapshot, used only to survive the authorization redirect.
#[derive(Clone)]
pub struct SnapshotStore {
    store: DurableStore,
}

impl SnapshotStore {
    pub fn new(store: DurableStore) -> Self {
        Self { store }
    }

    pub fn snapshot(&self, state: &SessionState) -> AppResult<SessionSnapshot> {
        self.snapshot_at(state, Utc::now())
    }

    pub fn snapshot_at(&self, state: &SessionState, now: DateTime<Utc>) -> AppResult<SessionSnapshot> {
        let snapshot = SessionSnapshot::capture(state, now);
        let payload = serde_json::to_string(&snapshot)?;
        self.store.put(SNAPSHOT_KEY, &payload)?;
        info!(
            target: "snapshot",
            profiles = snapshot.global_profiles.len(),
            uploads = snapshot.upload_records.len(),
            "session snapshot saved"
        );
        Ok(snapshot)
    }

    pub fn restore(&self) -> AppResult<Option<SessionSnapshot>> {
        self.restore_at(Utc::now())
    }

    /// Returns the stored snapshot if it is still fresh. Stale or unreadable
    /// snapshots are deleted. A fresh one stays stored until `clear`.
    pub fn restore_at(&self, now: DateTime<Utc>) -> AppResult<Option<SessionSnapshot>> {
        let Some(payload) = self.store.get(SNAPSHOT_KEY)? else {
            debug!(target: "snapshot", "no session snapshot stored");
            return Ok(None);
        };

        let snapshot = match serde_json::from_str::<SessionSnapshot>(&payload) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(target: "snapshot", error = %err, "discarding unreadable session snapshot");
                self.store.remove(SNAPSHOT_KEY)?;
                return Ok(None);
            }
        };

        if snapshot.is_stale(now) {
            info!(
                target: "snapshot",
                age_ms = now.timestamp_millis() - snapshot.timestamp,
                "discarding stale session snapshot"
            );
            self.store.remove(SNAPSHOT_KEY)?;
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    pub fn clear(&self) -> AppResult<()> {
        if self.store.remove(SNAPSHOT_KEY)? {
            debug!(target: "snapshot", "session snapshot cleared");
        }
        Ok(())
    }
}
