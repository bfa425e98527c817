use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("could not parse {name}: {reason}")]
    Parse { name: String, reason: String },
    #[error("authorization failed: {0}")]
    Authorization(String),
    #[error("remote operation failed: {0}")]
    Remote(String),
    #[error("no profiles to export")]
    NothingToExport,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Keychain(#[from] keyring::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl AppError {
    pub fn parse(name: impl Into<String>, reason: impl ToString) -> Self {
        AppError::Parse {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable tag used in notifications and CLI summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "configuration",
            AppError::Parse { .. } => "parse",
            AppError::Authorization(_) => "authorization",
            AppError::Remote(_) | AppError::Http(_) => "remote",
            AppError::NothingToExport => "empty",
            AppError::Io(_)
            | AppError::Database(_)
            | AppError::Keychain(_)
            | AppError::Json(_)
            | AppError::Csv(_) => "storage",
        }
    }

    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AppError::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_errors_are_fatal() {
        assert!(!AppError::Configuration("missing".into()).is_recoverable());
        assert!(AppError::Authorization("denied".into()).is_recoverable());
        assert!(AppError::Remote("500".into()).is_recoverable());
        assert!(AppError::parse("a.csv", "bad utf-8").is_recoverable());
    }

    #[test]
    fn parse_error_names_the_document() {
        let err = AppError::parse("contacts.csv", "invalid UTF-8");
        assert_eq!(err.kind(), "parse");
        assert_eq!(err.to_string(), "could not parse contacts.csv: invalid UTF-8");
    }
}
