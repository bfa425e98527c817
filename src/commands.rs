use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::errors::AppResult;
use crate::google::capture_callback;
use crate::pipeline::IngestReport;
use crate::session::{FileOutcome, SessionState, UploadRecord};
use crate::workflow::ExportOutcome;
use crate::{App, AppStatus, AuthState};

#[derive(Debug, Serialize)]
pub struct FileSummary {
    pub id: String,
    pub name: Option<String>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_identifiers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl From<&FileOutcome> for FileSummary {
    fn from(outcome: &FileOutcome) -> Self {
        match outcome {
            FileOutcome::Merged(summary) => Self {
                id: summary.id.clone(),
                name: Some(summary.name.clone()),
                status: "merged",
                extracted: Some(summary.extracted),
                new_identifiers: Some(summary.new_identifiers),
                error: None,
                error_kind: None,
            },
            FileOutcome::Rejected { id, name, error } => Self {
                id: id.clone(),
                name: Some(name.clone()),
                status: "rejected",
                extracted: None,
                new_identifiers: None,
                error: Some(error.to_string()),
                error_kind: Some(error.kind()),
            },
            FileOutcome::Ignored { id } => Self {
                id: id.clone(),
                name: None,
                status: "ignored",
                extracted: None,
                new_identifiers: None,
                error: None,
                error_kind: None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IngestSummary {
    pub files: Vec<FileSummary>,
    pub skipped: Vec<String>,
    pub uploads: Vec<UploadRecord>,
    pub total_unique: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_path: Option<String>,
}

impl IngestSummary {
    fn new(report: &IngestReport, state: &SessionState) -> Self {
        Self {
            files: report.outcomes.iter().map(FileSummary::from).collect(),
            skipped: report.skipped.clone(),
            uploads: state.uploads().to_vec(),
            total_unique: state.unique_count(),
            csv_path: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExportSummary {
    pub ingest: IngestSummary,
    pub restored_snapshot: bool,
    pub export: ExportOutcome,
}

#[derive(Debug, Serialize)]
pub struct CallbackSummary {
    pub restored_snapshot: bool,
    pub total_unique: usize,
    pub export: ExportOutcome,
}

#[derive(Debug, Serialize)]
pub struct SheetSummary {
    pub sheet_id: String,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct LogoutSummary {
    pub auth_state: AuthState,
}

pub async fn ingest(app: &App, paths: &[PathBuf], csv_out: Option<&Path>) -> AppResult<IngestSummary> {
    let mut state = SessionState::new();
    let report = app.ingest(&mut state, paths).await;
    let mut summary = IngestSummary::new(&report, &state);
    if let Some(dir) = csv_out {
        let path = app.export_local(&state, dir)?;
        summary.csv_path = Some(path.to_string_lossy().to_string());
    }
    Ok(summary)
}

pub async fn export_csv(app: &App, paths: &[PathBuf], out: &Path) -> AppResult<IngestSummary> {
    ingest(app, paths, Some(out)).await
}

/// Ingests `paths` and publishes the result. With `listen`, an authorization
/// redirect is awaited on the loopback address and the export resumes in
/// the same process.
pub async fn export(
    app: &App,
    paths: &[PathBuf],
    listen: bool,
    timeout_secs: Option<u64>,
) -> AppResult<ExportSummary> {
    let mut state = SessionState::new();
    let report = app.ingest(&mut state, paths).await;
    let ingest = IngestSummary::new(&report, &state);

    let outcome = app.workflow().request_export(&state).await?;
    let pending_url = match &outcome {
        ExportOutcome::AuthorizationRequired {
            authorization_url, ..
        } if listen => Some(authorization_url.clone()),
        _ => None,
    };
    let Some(authorization_url) = pending_url else {
        return Ok(ExportSummary {
            ingest,
            restored_snapshot: false,
            export: outcome,
        });
    };

    eprintln!("Open this URL to authorize Google Sheets access:\n{authorization_url}");
    let code = capture_callback(app.sheets().redirect_uri(), timeout_secs).await?;
    info!(target: "commands", "authorization code received");
    let resumed = app
        .workflow()
        .complete_authorization(&code, SessionState::new())
        .await?;

    Ok(ExportSummary {
        ingest,
        restored_snapshot: resumed.restored,
        export: resumed.export,
    })
}

pub async fn callback(app: &App, code: &str) -> AppResult<CallbackSummary> {
    let resumed = app
        .workflow()
        .complete_authorization(code, SessionState::new())
        .await?;
    Ok(CallbackSummary {
        restored_snapshot: resumed.restored,
        total_unique: resumed.state.unique_count(),
        export: resumed.export,
    })
}

pub async fn read_sheet(app: &App) -> AppResult<SheetSummary> {
    let rows = app.sheets().read_sheet().await?;
    Ok(SheetSummary {
        sheet_id: app.sheets().sheet_id().to_string(),
        rows,
    })
}

pub fn status(app: &App) -> AppResult<AppStatus> {
    app.status()
}

pub fn logout(app: &App) -> AppResult<LogoutSummary> {
    app.workflow().logout()?;
    Ok(LogoutSummary {
        auth_state: app.workflow().auth_state(None)?,
    })
}
