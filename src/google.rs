use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::export::sheet_rows;
use crate::ingestion::Profile;
use crate::secrets::SecretVault;

pub const TOKEN_ALIAS: &str = "google_sheets_access_token";
const CLEAR_RANGE: &str = "A:Z";
const WRITE_ANCHOR: &str = "A1";
const DEFAULT_LOOPBACK_TIMEOUT_SECS: u64 = 180;

const SHEETS_SCOPES: &[&str] = &["https://www.googleapis.com/auth/spreadsheets"];

/// OAuth handshake and Sheets REST calls for one configured spreadsheet.
#[derive(Clone)]
pub struct GoogleSheetsService {
    http: Client,
    settings: SheetsSettings,
    vault: SecretVault,
}

#[derive(Clone)]
struct SheetsSettings {
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
    auth_endpoint: String,
    token_endpoint: String,
    sheets_api_base: String,
    sheet_id: String,
    scopes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    /// A one-time code came back but no credential is stored yet.
    AwaitingCallback,
    Authenticated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    pub obtained_at: DateTime<Utc>,
}

impl GoogleSheetsService {
    pub fn new(config: &AppConfig, vault: &SecretVault) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("csv-profile-extractor/", env!("CARGO_PKG_VERSION")))
            .timeout(StdDuration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            settings: SheetsSettings {
                client_id: config.google_client_id.clone(),
                client_secret: config.google_client_secret.clone(),
                redirect_uri: config.google_redirect_uri.clone(),
                auth_endpoint: config.google_auth_endpoint.clone(),
                token_endpoint: config.google_token_endpoint.clone(),
                sheets_api_base: config.google_sheets_api_base.trim_end_matches('/').to_string(),
                sheet_id: config.google_sheet_id.clone(),
                scopes: SHEETS_SCOPES.join(" "),
            },
            vault: vault.clone(),
        })
    }

    pub fn sheet_id(&self) -> &str {
        &self.settings.sheet_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.settings.redirect_uri
    }

    pub fn authorization_url(&self) -> AppResult<String> {
        let mut auth_url = Url::parse(&self.settings.auth_endpoint).map_err(|err| {
            AppError::Configuration(format!("invalid Google auth endpoint: {err}"))
        })?;
        auth_url
            .query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("scope", &self.settings.scopes)
            .append_pair("response_type", "code")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(auth_url.to_string())
    }

    /// Pure read of the vault; the credential is never validated remotely here.
    pub fn is_authenticated(&self) -> AppResult<bool> {
        self.vault.has(TOKEN_ALIAS)
    }

    pub fn auth_state(&self, callback_code: Option<&str>) -> AppResult<AuthState> {
        if self.is_authenticated()? {
            return Ok(AuthState::Authenticated);
        }
        Ok(match callback_code {
            Some(code) if !code.trim().is_empty() => AuthState::AwaitingCallback,
            _ => AuthState::Unauthenticated,
        })
    }

    /// Trades the one-time code for a bearer credential and persists it.
    /// A failure leaves any stored credential untouched.
    pub async fn exchange_code(&self, code: &str) -> AppResult<StoredCredential> {
        let response = self
            .http
            .post(&self.settings.token_endpoint)
            .form(&[
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.expose_secret()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|err| AppError::Authorization(format!("token request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(AppError::Authorization(format!(
                "failed to exchange Google auth code ({})",
                response.status()
            )));
        }

        let success: TokenSuccessResponse = response.json().await.map_err(|err| {
            AppError::Authorization(format!("token response was not understood: {err}"))
        })?;
        let credential = StoredCredential {
            access_token: success.access_token,
            refresh_token: success.refresh_token,
            scope: success.scope,
            token_type: success.token_type,
            obtained_at: Utc::now(),
        };
        let payload = serde_json::to_string(&credential)?;
        self.vault
            .write_secret(TOKEN_ALIAS, &SecretString::new(payload.into()))?;
        info!(target: "google_auth", "stored Google Sheets credential");
        Ok(credential)
    }

    pub fn logout(&self) -> AppResult<()> {
        self.vault.delete(TOKEN_ALIAS)?;
        info!(target: "google_auth", "removed Google Sheets credential");
        Ok(())
    }

    /// Replaces the sheet contents with a header row plus one row per profile.
    ///
    /// Clear and write are separate calls; if the write fails after a
    /// successful clear the sheet is left empty.
    pub async fn write_profiles(&self, profiles: &[Profile]) -> AppResult<usize> {
        let credential = self.require_credential()?;
        let values = sheet_rows(profiles);

        self.clear_sheet(&credential).await?;
        self.update_sheet(&credential, &values).await?;
        info!(
            target: "sheets",
            sheet_id = %self.settings.sheet_id,
            rows = profiles.len(),
            "sheet overwritten"
        );
        Ok(profiles.len())
    }

    pub async fn read_sheet(&self) -> AppResult<Vec<Vec<String>>> {
        let credential = self.require_credential()?;
        let url = self.values_url(CLEAR_RANGE)?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&credential.access_token)
            .send()
            .await
            .map_err(remote_error)?;
        let response = ensure_success(response, "read sheet data")?;
        let range: ValueRange = response.json().await.map_err(remote_error)?;
        Ok(range.values)
    }

    async fn clear_sheet(&self, credential: &StoredCredential) -> AppResult<()> {
        let url = self.values_url(&format!("{CLEAR_RANGE}:clear"))?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&credential.access_token)
            .json(&json!({}))
            .send()
            .await
            .map_err(remote_error)?;
        ensure_success(response, "clear sheet data")?;
        debug!(target: "sheets", "sheet cleared");
        Ok(())
    }

    async fn update_sheet(&self, credential: &StoredCredential, values: &[Vec<String>]) -> AppResult<()> {
        let mut url = self.values_url(WRITE_ANCHOR)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let response = self
            .http
            .put(url)
            .bearer_auth(&credential.access_token)
            .json(&json!({ "values": values }))
            .send()
            .await
            .map_err(remote_error)?;
        ensure_success(response, "update sheet data")?;
        Ok(())
    }

    fn values_url(&self, range: &str) -> AppResult<Url> {
        let raw = format!(
            "{}/spreadsheets/{}/values/{}",
            self.settings.sheets_api_base, self.settings.sheet_id, range
        );
        Url::parse(&raw)
            .map_err(|err| AppError::Configuration(format!("invalid Sheets API URL {raw}: {err}")))
    }

    fn require_credential(&self) -> AppResult<StoredCredential> {
        self.load_credential()?.ok_or_else(|| {
            AppError::Authorization("user not authenticated; authorize Google Sheets first".into())
        })
    }

    fn load_credential(&self) -> AppResult<Option<StoredCredential>> {
        let Some(secret) = self.vault.read_secret(TOKEN_ALIAS)? else {
            return Ok(None);
        };
        let raw = secret.expose_secret();
        match serde_json::from_str::<StoredCredential>(raw) {
            Ok(credential) => Ok(Some(credential)),
            Err(_) => {
                // Bare tokens written by other tools are accepted as-is.
                warn!(target: "google_auth", "stored credential is not JSON; using it verbatim");
                Ok(Some(StoredCredential {
                    access_token: raw.to_string(),
                    refresh_token: None,
                    scope: None,
                    token_type: None,
                    obtained_at: Utc::now(),
                }))
            }
        }
    }
}

fn remote_error(err: reqwest::Error) -> AppError {
    AppError::Remote(format!("Sheets request failed: {err}"))
}

fn ensure_success(response: Response, action: &str) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let hint = if status.as_u16() == 401 || status.as_u16() == 403 {
        "; the stored credential may be invalid, sign out and authorize again"
    } else {
        ""
    };
    Err(AppError::Remote(format!("failed to {action} ({status}){hint}")))
}

/// Waits on a loopback redirect URI for the browser to deliver the
/// authorization code. Only `127.0.0.1`/`localhost` URIs with a port work.
pub async fn capture_callback(redirect_uri: &str, timeout_secs: Option<u64>) -> AppResult<String> {
    let url = Url::parse(redirect_uri)
        .map_err(|err| AppError::Configuration(format!("invalid redirect URI: {err}")))?;
    let host = url.host_str().unwrap_or_default();
    if !matches!(host, "127.0.0.1" | "localhost") {
        return Err(AppError::Configuration(format!(
            "redirect URI {redirect_uri} is not a loopback address"
        )));
    }
    let port = url.port().ok_or_else(|| {
        AppError::Configuration(format!("redirect URI {redirect_uri} has no port"))
    })?;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!(target: "google_auth", port, "waiting for Google authorization redirect");
    let wait_secs = timeout_secs.unwrap_or(DEFAULT_LOOPBACK_TIMEOUT_SECS).max(5);
    timeout(StdDuration::from_secs(wait_secs), handle_loopback_callback(listener))
        .await
        .map_err(|_| AppError::Authorization("timed out waiting for Google approval".into()))?
}

async fn handle_loopback_callback(listener: TcpListener) -> AppResult<String> {
    let (mut socket, _) = listener.accept().await?;
    let mut buffer = [0u8; 4096];
    let read = socket.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..read]);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| AppError::Authorization("invalid redirect request".into()))?;

    let url = Url::parse(&format!("http://127.0.0.1{path}"))
        .map_err(|err| AppError::Authorization(format!("failed to parse redirect: {err}")))?;
    let query_value = |key: &str| {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.to_string())
    };

    let (status, body, result) = match (query_value("code"), query_value("error")) {
        (Some(code), None) => (
            "200 OK",
            html_body("Google Sheets access approved. You can close this window."),
            Ok(code),
        ),
        (_, Some(err)) => (
            "400 Bad Request",
            html_body("Google sign-in was denied. You may close this window."),
            Err(AppError::Authorization(format!("google sign-in failed: {err}"))),
        ),
        (None, None) => (
            "400 Bad Request",
            html_body("Missing authorization code. Please retry the export."),
            Err(AppError::Authorization("google sign-in missing code".into())),
        ),
    };

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;

    result
}

fn html_body(message: &str) -> String {
    format!("<html><body><h3>{message}</h3><p>Return to the terminal.</p></body></html>")
}

#[derive(Deserialize)]
struct TokenSuccessResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn service(vault: &SecretVault) -> GoogleSheetsService {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("GOOGLE_CLIENT_ID", "client-123"),
            ("GOOGLE_CLIENT_SECRET", "shh"),
            ("GOOGLE_SHEET_ID", "sheet-9"),
            ("GOOGLE_PROJECT_ID", "project"),
            ("GOOGLE_REDIRECT_URI", "http://localhost:8080/"),
        ]);
        let config = AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        GoogleSheetsService::new(&config, vault).unwrap()
    }

    #[test]
    fn authorization_url_requests_offline_consent() {
        let google = service(&SecretVault::in_memory());
        let url = Url::parse(&google.authorization_url().unwrap()).unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(url.path(), "/o/oauth2/auth");

        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["redirect_uri"], "http://localhost:8080/");
        assert_eq!(params["scope"], "https://www.googleapis.com/auth/spreadsheets");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
    }

    #[test]
    fn auth_state_follows_the_vault() {
        let vault = SecretVault::in_memory();
        let google = service(&vault);
        assert_eq!(google.auth_state(None).unwrap(), AuthState::Unauthenticated);
        assert_eq!(google.auth_state(Some("")).unwrap(), AuthState::Unauthenticated);
        assert_eq!(
            google.auth_state(Some("4/abc")).unwrap(),
            AuthState::AwaitingCallback
        );

        vault
            .write_secret(TOKEN_ALIAS, &SecretString::new("bare-token".into()))
            .unwrap();
        assert_eq!(google.auth_state(Some("4/abc")).unwrap(), AuthState::Authenticated);
        assert_eq!(google.require_credential().unwrap().access_token, "bare-token");

        google.logout().unwrap();
        assert!(!google.is_authenticated().unwrap());
    }

    #[tokio::test]
    async fn export_without_credential_is_an_authorization_error() {
        let google = service(&SecretVault::in_memory());
        let err = google.write_profiles(&[]).await.unwrap_err();
        assert_eq!(err.kind(), "authorization");
        let err = google.read_sheet().await.unwrap_err();
        assert_eq!(err.kind(), "authorization");
    }

    #[test]
    fn values_urls_target_the_configured_sheet() {
        let google = service(&SecretVault::in_memory());
        let clear = google.values_url("A:Z:clear").unwrap();
        assert_eq!(
            clear.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-9/values/A:Z:clear"
        );
    }

    #[tokio::test]
    async fn loopback_capture_rejects_remote_hosts() {
        let err = capture_callback("https://example.com/callback", Some(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }
}
