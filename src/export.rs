use std::fs;
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, WriterBuilder};
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::ingestion::Profile;

pub const SHEET_HEADER: [&str; 2] = ["Name", "LinkedIn URL"];
pub const LOCAL_EXPORT_FILE_NAME: &str = "linkedin_profiles.csv";

/// Header row followed by one `[label, identifier]` row per profile, in order.
pub fn sheet_rows(profiles: &[Profile]) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(profiles.len() + 1);
    rows.push(SHEET_HEADER.iter().map(|cell| cell.to_string()).collect());
    rows.extend(
        profiles
            .iter()
            .map(|profile| vec![profile.label.clone(), profile.identifier.clone()]),
    );
    rows
}

/// Writes the profiles as a two-column CSV into `dir`. Cells are written
/// without quoting, matching the naive splitter used on ingestion.
pub fn write_local_csv(profiles: &[Profile], dir: &Path) -> AppResult<PathBuf> {
    if profiles.is_empty() {
        return Err(AppError::NothingToExport);
    }
    fs::create_dir_all(dir)?;
    let path = dir.join(LOCAL_EXPORT_FILE_NAME);

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .from_path(&path)?;
    for row in sheet_rows(profiles) {
        writer.write_record(&row)?;
    }
    writer.flush()?;

    info!(
        target: "export",
        path = %path.display(),
        rows = profiles.len(),
        "local CSV written"
    );
    Ok(path)
}
