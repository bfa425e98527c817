use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppResult;
use crate::google::{AuthState, GoogleSheetsService};
use crate::notifications::NotificationCenter;
use crate::session::SessionState;
use crate::snapshot::SnapshotStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExportOutcome {
    Exported {
        sheet_id: String,
        rows: usize,
    },
    /// The session was snapshotted; the caller must send the user here.
    AuthorizationRequired {
        authorization_url: String,
        snapshot_profiles: usize,
    },
}

#[derive(Debug)]
pub struct ResumeOutcome {
    pub state: SessionState,
    pub restored: bool,
    pub export: ExportOutcome,
}

/// Drives "publish the deduplicated profiles to the sheet" across the
/// authorization redirect.
#[derive(Clone)]
pub struct ExportWorkflow {
    sheets: GoogleSheetsService,
    snapshots: SnapshotStore,
    notices: NotificationCenter,
}

impl ExportWorkflow {
    pub fn new(
        sheets: GoogleSheetsService,
        snapshots: SnapshotStore,
        notices: NotificationCenter,
    ) -> Self {
        Self {
            sheets,
            snapshots,
            notices,
        }
    }

    pub fn auth_state(&self, callback_code: Option<&str>) -> AppResult<AuthState> {
        self.sheets.auth_state(callback_code)
    }

    /// Exports right away when a credential is stored. Otherwise snapshots
    /// `state` and returns the consent URL without touching the network.
    pub async fn request_export(&self, state: &SessionState) -> AppResult<ExportOutcome> {
        if self.sheets.is_authenticated()? {
            return self.export_now(state).await;
        }

        let snapshot = self.snapshots.snapshot(state)?;
        let authorization_url = self.sheets.authorization_url()?;
        self.notices.info(
            "Redirecting to Google",
            "Authorize Google Sheets access to finish the export",
        );
        Ok(ExportOutcome::AuthorizationRequired {
            authorization_url,
            snapshot_profiles: snapshot.global_profiles.len(),
        })
    }

    /// Exchanges the callback code, restores the pre-redirect session and
    /// retries the export. On exchange failure nothing is restored and the
    /// snapshot stays until it expires or another export replaces it.
    pub async fn complete_authorization(
        &self,
        code: &str,
        live: SessionState,
    ) -> AppResult<ResumeOutcome> {
        if let Err(err) = self.sheets.exchange_code(code).await {
            self.notices.error("Authentication failed", &err);
            return Err(err);
        }
        self.notices
            .success("Authenticated", "Google Sheets access granted");

        let pending = match self.snapshots.restore() {
            Ok(pending) => pending,
            Err(err) => {
                self.notices.error("Could not restore session", &err);
                return Err(err);
            }
        };
        let (state, restored) = match pending {
            Some(snapshot) => {
                info!(
                    target: "workflow",
                    profiles = snapshot.global_profiles.len(),
                    "restoring session after authorization"
                );
                (live.absorb_snapshot(snapshot), true)
            }
            None => {
                warn!(target: "workflow", "no fresh snapshot to restore after authorization");
                (live, false)
            }
        };

        if state.profiles().is_empty() {
            self.notices.info(
                "Publishing empty profile list",
                "Nothing was restored; the sheet will keep only its header row",
            );
        }

        let export = self.request_export(&state).await?;
        Ok(ResumeOutcome {
            state,
            restored,
            export,
        })
    }

    pub fn logout(&self) -> AppResult<()> {
        self.sheets.logout()?;
        self.notices.info("Signed out", "Google Sheets credential removed");
        Ok(())
    }

    async fn export_now(&self, state: &SessionState) -> AppResult<ExportOutcome> {
        match self.sheets.write_profiles(state.profiles()).await {
            Ok(rows) => {
                self.snapshots.clear()?;
                self.notices.success(
                    "Export complete",
                    format!("{rows} profiles written to Google Sheets"),
                );
                Ok(ExportOutcome::Exported {
                    sheet_id: self.sheets.sheet_id().to_string(),
                    rows,
                })
            }
            Err(err) => {
                self.notices.error("Export failed", &err);
                Err(err)
            }
        }
    }
}
