use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};

const DEFAULT_NOTIFICATION_BUFFER_MAX_BYTES: u64 = 1024 * 1024;
const DEFAULT_NOTIFICATION_BUFFER_MAX_FILES: usize = 3;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8765/";
const DEFAULT_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";

const REQUIRED_VARS: &[&str] = &[
    "GOOGLE_CLIENT_ID",
    "GOOGLE_CLIENT_SECRET",
    "GOOGLE_SHEET_ID",
    "GOOGLE_PROJECT_ID",
];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub google_client_id: String,
    pub google_client_secret: SecretString,
    pub google_sheet_id: String,
    pub google_project_id: String,
    pub google_redirect_uri: String,
    pub google_auth_endpoint: String,
    pub google_token_endpoint: String,
    pub google_sheets_api_base: String,
    pub http_timeout_secs: u64,
    pub database_file_name: String,
    pub notification_buffer_max_bytes: u64,
    pub notification_buffer_max_files: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub google_client_id: String,
    pub google_sheet_id: String,
    pub google_project_id: String,
    pub google_redirect_uri: String,
    pub http_timeout_secs: u64,
    pub database_file_name: String,
    pub has_client_secret: bool,
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        load_dotenv_if_applicable();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Every required
    /// variable is checked before failing so the error lists all of them.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|key| read(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Configuration(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let required = |key: &str| read(key).unwrap_or_default();
        let or_default = |key: &str, default: &str| read(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            google_client_id: required("GOOGLE_CLIENT_ID"),
            google_client_secret: SecretString::new(required("GOOGLE_CLIENT_SECRET").into()),
            google_sheet_id: required("GOOGLE_SHEET_ID"),
            google_project_id: required("GOOGLE_PROJECT_ID"),
            google_redirect_uri: or_default("GOOGLE_REDIRECT_URI", DEFAULT_REDIRECT_URI),
            google_auth_endpoint: or_default("GOOGLE_AUTH_ENDPOINT", DEFAULT_AUTH_ENDPOINT),
            google_token_endpoint: or_default("GOOGLE_TOKEN_ENDPOINT", DEFAULT_TOKEN_ENDPOINT),
            google_sheets_api_base: or_default("GOOGLE_SHEETS_API_BASE", DEFAULT_SHEETS_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            http_timeout_secs: parse_u64(&read("HTTP_TIMEOUT_SECS"), DEFAULT_HTTP_TIMEOUT_SECS)
                .max(1),
            database_file_name: or_default("DATABASE_FILE_NAME", "profile-extractor.db"),
            notification_buffer_max_bytes: parse_u64(
                &read("NOTIFICATION_BUFFER_MAX_BYTES"),
                DEFAULT_NOTIFICATION_BUFFER_MAX_BYTES,
            ),
            notification_buffer_max_files: parse_usize(
                &read("NOTIFICATION_BUFFER_MAX_FILES"),
                DEFAULT_NOTIFICATION_BUFFER_MAX_FILES,
            )
            .max(1),
        })
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            google_client_id: self.google_client_id.clone(),
            google_sheet_id: self.google_sheet_id.clone(),
            google_project_id: self.google_project_id.clone(),
            google_redirect_uri: self.google_redirect_uri.clone(),
            http_timeout_secs: self.http_timeout_secs,
            database_file_name: self.database_file_name.clone(),
            has_client_secret: true,
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions)
        || env::var("ALLOW_DOTENV")
            .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
            .unwrap_or(false)
}

fn parse_u64(value: &Option<String>, default: u64) -> u64 {
    value
        .as_deref()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(value: &Option<String>, default: usize) -> usize {
    value
        .as_deref()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}
