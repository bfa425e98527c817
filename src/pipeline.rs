use std::path::{Path, PathBuf};

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, warn};

use crate::errors::AppResult;
use crate::ingestion::{display_name, RawDocument};
use crate::session::{FileOutcome, IngestEvent, SessionState};

const READ_CHUNK_BYTES: usize = 16 * 1024;

#[derive(Debug, Default)]
pub struct IngestReport {
    pub outcomes: Vec<FileOutcome>,
    /// Names of inputs that were not CSV files.
    pub skipped: Vec<String>,
}

pub fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Reads every CSV path on its own task and feeds the resulting events to
/// `state` in arrival order. Only this function mutates `state`.
pub async fn ingest_paths(state: &mut SessionState, paths: &[PathBuf]) -> IngestReport {
    let mut report = IngestReport::default();
    let (tx, mut rx) = unbounded_channel();

    for path in paths {
        if !is_csv(path) {
            warn!(target: "pipeline", path = %path.display(), "skipping non-CSV input");
            report.skipped.push(display_name(path));
            continue;
        }
        let size = tokio::fs::metadata(path)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);
        let id = state.submit(display_name(path), size);
        let tx = tx.clone();
        let path = path.clone();
        tokio::spawn(async move {
            read_document(id, path, size, tx).await;
        });
    }
    drop(tx);

    while let Some(event) = rx.recv().await {
        if let Some(outcome) = state.apply(event) {
            report.outcomes.push(outcome);
        }
    }

    debug!(
        target: "pipeline",
        files = report.outcomes.len(),
        skipped = report.skipped.len(),
        unique = state.unique_count(),
        "ingestion finished"
    );
    report
}

async fn read_document(id: String, path: PathBuf, size: u64, tx: UnboundedSender<IngestEvent>) {
    let event = match read_with_progress(&id, &path, size, &tx).await {
        Ok(document) => IngestEvent::Completed { id, document },
        Err(error) => IngestEvent::Failed { id, error },
    };
    let _ = tx.send(event);
}

async fn read_with_progress(
    id: &str,
    path: &Path,
    size: u64,
    tx: &UnboundedSender<IngestEvent>,
) -> AppResult<RawDocument> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut bytes = Vec::with_capacity(size as usize);
    let mut chunk = vec![0_u8; READ_CHUNK_BYTES];

    loop {
        let read = file.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..read]);
        let _ = tx.send(IngestEvent::Progress {
            id: id.to_string(),
            progress: read_progress(bytes.len() as u64, size),
        });
    }

    Ok(RawDocument::new(display_name(path), bytes))
}

/// Percentage of `total` read so far. Capped below 100; completion sets 100.
fn read_progress(read: u64, total: u64) -> u8 {
    if total == 0 {
        return 99;
    }
    (read.saturating_mul(100) / total).min(99) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::UploadStatus;
    use tempfile::tempdir;

    #[tokio::test]
    async fn ingests_files_and_dedupes_across_them() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.CSV");
        let notes = dir.path().join("notes.txt");
        std::fs::write(
            &first,
            "Full Name,LinkedIn URL\nAda,https://linkedin.com/in/ada\nBob,https://linkedin.com/in/bob/\n",
        )
        .unwrap();
        std::fs::write(
            &second,
            "Name,LinkedIn\nBobby,https://LinkedIn.com/in/bob\nCy,https://linkedin.com/in/cy\n",
        )
        .unwrap();
        std::fs::write(&notes, "not relevant").unwrap();

        let mut state = SessionState::new();
        let report = ingest_paths(&mut state, &[first, second, notes]).await;

        assert_eq!(report.skipped, vec!["notes.txt".to_string()]);
        assert_eq!(report.outcomes.len(), 2);
        let added: usize = report
            .outcomes
            .iter()
            .map(|outcome| match outcome {
                FileOutcome::Merged(summary) => summary.added,
                _ => 0,
            })
            .sum();
        assert_eq!(added, 3);
        assert_eq!(state.unique_count(), 3);
        assert!(state
            .uploads()
            .iter()
            .all(|record| record.status == UploadStatus::Completed && record.progress == 100));
    }

    #[tokio::test]
    async fn missing_file_is_reported_as_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.csv");

        let mut state = SessionState::new();
        let report = ingest_paths(&mut state, &[missing]).await;

        assert!(matches!(report.outcomes[0], FileOutcome::Rejected { .. }));
        assert_eq!(state.uploads()[0].status, UploadStatus::Error);
    }

    #[test]
    fn progress_never_reports_done_before_completion() {
        assert_eq!(read_progress(50, 100), 50);
        assert_eq!(read_progress(100, 100), 99);
        assert_eq!(read_progress(10, 0), 99);
    }
}
