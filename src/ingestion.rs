use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::accumulator::ProfileSet;
use crate::errors::{AppError, AppResult};

/// Header substring that marks a column holding profile URLs.
pub const IDENTIFIER_HEADER_MARKER: &str = "linkedin";
/// Header substrings that mark a column holding a person's name.
pub const LABEL_HEADER_MARKERS: &[&str] = &["name", "contact", "person"];
/// Every accepted identifier must contain this after normalization.
pub const IDENTIFIER_DOMAIN_MARKER: &str = "linkedin.com";
pub const UNKNOWN_LABEL: &str = "Unknown";

/// One uploaded file as read from disk. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub name: String,
    pub size: u64,
    bytes: Vec<u8>,
}

impl RawDocument {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            bytes,
        }
    }

    pub fn text(&self) -> AppResult<&str> {
        std::str::from_utf8(&self.bytes)
            .map_err(|err| AppError::parse(&self.name, format!("invalid UTF-8: {err}")))
    }
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub identifier: String,
    pub label: String,
}

/// Columns of a header row whose lower-cased, quote-stripped name matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderIndex {
    identifier_columns: Vec<usize>,
    label_columns: Vec<usize>,
}

impl HeaderIndex {
    pub fn parse(line: &str) -> Self {
        let headers: Vec<String> = line.split(',').map(|h| clean_cell(&h.to_lowercase())).collect();

        let identifier_columns = headers
            .iter()
            .enumerate()
            .filter(|(_, header)| header.contains(IDENTIFIER_HEADER_MARKER))
            .map(|(idx, _)| idx)
            .collect();
        let label_columns = headers
            .iter()
            .enumerate()
            .filter(|(_, header)| LABEL_HEADER_MARKERS.iter().any(|m| header.contains(m)))
            .map(|(idx, _)| idx)
            .collect();

        Self {
            identifier_columns,
            label_columns,
        }
    }

    pub fn identifier_columns(&self) -> &[usize] {
        &self.identifier_columns
    }

    pub fn label_columns(&self) -> &[usize] {
        &self.label_columns
    }

    /// Only the first label column is ever consulted.
    pub fn label_column(&self) -> Option<usize> {
        self.label_columns.first().copied()
    }

    pub fn is_relevant(&self) -> bool {
        !self.identifier_columns.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Unique identifiers of this file absent from the global set before merge.
    pub new_identifier_count: usize,
    /// Unique identifiers of this file in first-seen order.
    pub identifiers: Vec<String>,
    pub profiles: Vec<Profile>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

/// Lower-cases the value and strips exactly one trailing slash.
pub fn normalize_identifier(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    match lowered.strip_suffix('/') {
        Some(stripped) => stripped.to_string(),
        None => lowered,
    }
}

/// Parses one document into candidate profiles.
///
/// Rows are split on every comma; quoted fields containing commas are not
/// honoured and will misparse. `known` is only read, to compute
/// `new_identifier_count` against the state prior to this file's merge.
pub fn extract_profiles(document: &RawDocument, known: &ProfileSet) -> AppResult<Extraction> {
    let text = document.text()?;
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() < 2 {
        debug!(target: "ingestion", document = %document.name, "no data rows");
        return Ok(Extraction::default());
    }

    let header = HeaderIndex::parse(lines[0]);
    if !header.is_relevant() {
        debug!(
            target: "ingestion",
            document = %document.name,
            "no profile URL column found"
        );
        return Ok(Extraction::default());
    }
    let label_column = header.label_column();

    let mut seen = HashSet::new();
    let mut identifiers = Vec::new();
    let mut profiles = Vec::new();

    for line in lines.iter().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let cells: Vec<String> = line.split(',').map(clean_cell).collect();

        for &column in header.identifier_columns() {
            let Some(cell) = cells.get(column).filter(|cell| !cell.is_empty()) else {
                continue;
            };
            let identifier = normalize_identifier(cell);
            if !identifier.contains(IDENTIFIER_DOMAIN_MARKER) {
                continue;
            }

            if seen.insert(identifier.clone()) {
                identifiers.push(identifier.clone());
            }
            let label = label_column
                .and_then(|idx| cells.get(idx))
                .filter(|value| !value.is_empty())
                .map(|value| value.to_string())
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
            profiles.push(Profile { identifier, label });
        }
    }

    let new_identifier_count = known.count_new(&identifiers);
    debug!(
        target: "ingestion",
        document = %document.name,
        identifiers = identifiers.len(),
        new_identifiers = new_identifier_count,
        "extracted profiles"
    );

    Ok(Extraction {
        new_identifier_count,
        identifiers,
        profiles,
    })
}

fn clean_cell(raw: &str) -> String {
    raw.trim().replace('"', "")
}
