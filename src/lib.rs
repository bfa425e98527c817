mod accumulator;
pub mod commands;
mod config;
mod db;
mod errors;
mod export;
mod google;
mod ingestion;
mod notifications;
mod pipeline;
mod secrets;
mod session;
mod snapshot;
mod workflow;

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::accumulator::ProfileSet;
pub use crate::config::{AppConfig, PublicAppConfig};
pub use crate::db::DurableStore;
pub use crate::errors::{AppError, AppResult};
pub use crate::export::{sheet_rows, write_local_csv, LOCAL_EXPORT_FILE_NAME, SHEET_HEADER};
pub use crate::google::{capture_callback, AuthState, GoogleSheetsService, StoredCredential, TOKEN_ALIAS};
pub use crate::ingestion::{
    extract_profiles, normalize_identifier, Extraction, HeaderIndex, Profile, RawDocument,
};
pub use crate::notifications::{Notice, NoticeLevel, NotificationCenter};
pub use crate::pipeline::{ingest_paths, IngestReport};
pub use crate::secrets::SecretVault;
pub use crate::session::{FileOutcome, IngestEvent, MergeSummary, SessionState, UploadRecord, UploadStatus};
pub use crate::snapshot::{SessionSnapshot, SnapshotStore, SNAPSHOT_KEY};
pub use crate::workflow::{ExportOutcome, ExportWorkflow, ResumeOutcome};

const VAULT_SERVICE_NAME: &str = "CsvProfileExtractor";

/// Wires configuration, storage, notifications and the Google client for one
/// data directory. Session state is owned by the caller.
pub struct App {
    config: AppConfig,
    data_dir: PathBuf,
    db_path: PathBuf,
    db_recovered: bool,
    sheets: GoogleSheetsService,
    snapshots: SnapshotStore,
    notices: NotificationCenter,
    workflow: ExportWorkflow,
}

#[derive(Debug, Serialize)]
pub struct AppStatus {
    pub data_dir: String,
    pub db_path: String,
    pub db_bootstrap_recovered: bool,
    pub notification_buffer_path: String,
    pub pending_notifications: usize,
    pub auth_state: AuthState,
    pub has_pending_snapshot: bool,
    pub pending_snapshot_profiles: Option<usize>,
    pub config: PublicAppConfig,
}

impl App {
    pub fn initialize(data_dir: &Path) -> AppResult<Self> {
        init_tracing();
        let config = AppConfig::from_env()?;
        Self::with_parts(config, SecretVault::new(VAULT_SERVICE_NAME), data_dir)
    }

    /// Builds the app around an explicit config and vault.
    pub fn with_parts(config: AppConfig, vault: SecretVault, data_dir: &Path) -> AppResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db::DatabaseBootstrap {
            context: db::DatabaseContext { connection, path },
            recovered,
        } = db::bootstrap(data_dir, &config.database_file_name)?;

        let notices = NotificationCenter::new(data_dir, &config)?;
        let sheets = GoogleSheetsService::new(&config, &vault)?;
        let snapshots = SnapshotStore::new(DurableStore::new(connection));
        let workflow = ExportWorkflow::new(sheets.clone(), snapshots.clone(), notices.clone());

        if recovered {
            notices.info(
                "Storage reset",
                "The local database was unreadable and has been recreated",
            );
        }
        info!(
            target: "app",
            version = env!("CARGO_PKG_VERSION"),
            data_dir = %data_dir.display(),
            "application initialized"
        );

        Ok(Self {
            config,
            data_dir: data_dir.to_path_buf(),
            db_path: path,
            db_recovered: recovered,
            sheets,
            snapshots,
            notices,
            workflow,
        })
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notices
    }

    pub fn workflow(&self) -> &ExportWorkflow {
        &self.workflow
    }

    pub fn sheets(&self) -> &GoogleSheetsService {
        &self.sheets
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Ingests `paths` into `state` and reports each file as a notification.
    pub async fn ingest(&self, state: &mut SessionState, paths: &[PathBuf]) -> IngestReport {
        let report = ingest_paths(state, paths).await;
        for name in &report.skipped {
            self.notices
                .info("Skipped file", format!("{name} is not a CSV file"));
        }
        for outcome in &report.outcomes {
            match outcome {
                FileOutcome::Merged(summary) => self.notices.success(
                    "File processed",
                    format!(
                        "{}: {} profiles, {} new",
                        summary.name, summary.extracted, summary.new_identifiers
                    ),
                ),
                FileOutcome::Rejected { name, error, .. } => {
                    self.notices.error(format!("Could not process {name}"), error)
                }
                FileOutcome::Ignored { .. } => {}
            }
        }
        report
    }

    pub fn export_local(&self, state: &SessionState, dir: &Path) -> AppResult<PathBuf> {
        match write_local_csv(state.profiles(), dir) {
            Ok(path) => {
                self.notices
                    .success("CSV saved", format!("Wrote {}", path.display()));
                Ok(path)
            }
            Err(err) => {
                self.notices.error("CSV export failed", &err);
                Err(err)
            }
        }
    }

    pub fn status(&self) -> AppResult<AppStatus> {
        let pending = self.snapshots.restore()?;
        Ok(AppStatus {
            data_dir: self.data_dir.to_string_lossy().to_string(),
            db_path: self.db_path.to_string_lossy().to_string(),
            db_bootstrap_recovered: self.db_recovered,
            notification_buffer_path: self.notices.buffer_path().to_string_lossy().to_string(),
            pending_notifications: self.notices.queue_depth(),
            auth_state: self.sheets.auth_state(None)?,
            has_pending_snapshot: pending.is_some(),
            pending_snapshot_profiles: pending.map(|snapshot| snapshot.global_profiles.len()),
            config: self.config.public_profile(),
        })
    }

    /// Writes queued notifications to the on-disk buffer.
    pub fn finish(&self) {
        if let Err(err) = self.notices.flush() {
            warn!(target: "app", ?err, "failed to flush notifications");
        }
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,profile_extractor_lib=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}
