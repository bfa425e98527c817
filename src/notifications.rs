use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

const BUFFER_FILE_NAME: &str = "notifications.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    pub timestamp: DateTime<Utc>,
}

/// User-facing notification channel. Every notice is logged, kept in the
/// session history and appended to a rotating JSON-lines buffer on flush.
#[derive(Clone)]
pub struct NotificationCenter {
    queue: Arc<Mutex<Vec<Notice>>>,
    history: Arc<Mutex<Vec<Notice>>>,
    buffer_path: PathBuf,
    max_file_bytes: u64,
    max_file_count: usize,
}

impl NotificationCenter {
    pub fn new<P: AsRef<Path>>(data_dir: P, config: &AppConfig) -> AppResult<Self> {
        Self::with_limits(
            data_dir,
            config.notification_buffer_max_bytes,
            config.notification_buffer_max_files,
        )
    }

    pub fn with_limits<P: AsRef<Path>>(
        data_dir: P,
        max_file_bytes: u64,
        max_file_count: usize,
    ) -> AppResult<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        let buffer_path = data_dir.join(BUFFER_FILE_NAME);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&buffer_path)?;

        Ok(Self {
            queue: Arc::new(Mutex::new(Vec::new())),
            history: Arc::new(Mutex::new(Vec::new())),
            buffer_path,
            max_file_bytes,
            max_file_count: max_file_count.max(1),
        })
    }

    pub fn info(&self, title: impl Into<String>, description: impl Into<String>) {
        self.push(NoticeLevel::Info, title.into(), description.into(), None);
    }

    pub fn success(&self, title: impl Into<String>, description: impl Into<String>) {
        self.push(NoticeLevel::Success, title.into(), description.into(), None);
    }

    pub fn error(&self, title: impl Into<String>, err: &AppError) {
        self.push(
            NoticeLevel::Error,
            title.into(),
            err.to_string(),
            Some(err.kind()),
        );
    }

    pub fn history(&self) -> Vec<Notice> {
        self.history.lock().clone()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn buffer_path(&self) -> &Path {
        &self.buffer_path
    }

    pub fn flush(&self) -> AppResult<()> {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            return Ok(());
        }
        let (encoded, total_bytes) = encode_batch(&queue)?;
        self.write_batch(&encoded, total_bytes)?;
        queue.clear();
        Ok(())
    }

    fn push(
        &self,
        level: NoticeLevel,
        title: String,
        description: String,
        error_kind: Option<&'static str>,
    ) {
        match level {
            NoticeLevel::Error => error!(target: "notice", %title, %description, "notice"),
            NoticeLevel::Success | NoticeLevel::Info => {
                info!(target: "notice", %title, %description, "notice")
            }
        }
        let notice = Notice {
            level,
            title,
            description,
            error_kind,
            timestamp: Utc::now(),
        };
        self.history.lock().push(notice.clone());
        self.queue.lock().push(notice);
    }

    fn write_batch(&self, encoded: &[Vec<u8>], incoming_bytes: u64) -> AppResult<()> {
        self.rotate_if_needed(incoming_bytes)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.buffer_path)?;

        for line in encoded {
            file.write_all(line)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(())
    }

    fn rotate_if_needed(&self, incoming_bytes: u64) -> AppResult<()> {
        let current_size = fs::metadata(&self.buffer_path)
            .map(|m| m.len())
            .unwrap_or(0);
        if current_size == 0 || current_size + incoming_bytes <= self.max_file_bytes {
            return Ok(());
        }

        if self.max_file_count <= 1 {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.buffer_path)?;
            return Ok(());
        }

        let rotated_name = format!(
            "{}-{}.jsonl",
            self.buffer_stem(),
            Utc::now().format("%Y%m%d%H%M%S%3f")
        );
        let rotated_path = self
            .buffer_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(rotated_name);

        if self.buffer_path.exists() {
            fs::rename(&self.buffer_path, &rotated_path)?;
        }

        self.prune_rotations()?;
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.buffer_path)?;
        Ok(())
    }

    fn prune_rotations(&self) -> AppResult<()> {
        let parent = self.buffer_path.parent().unwrap_or_else(|| Path::new("."));
        let prefix = format!("{}-", self.buffer_stem());
        let mut rotations = fs::read_dir(parent)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                (name.starts_with(&prefix) && name.ends_with(".jsonl")).then(|| entry.path())
            })
            .collect::<Vec<_>>();

        // Timestamped names sort chronologically.
        rotations.sort();
        let allowed = self.max_file_count.saturating_sub(1);
        if rotations.len() > allowed {
            let excess = rotations.len() - allowed;
            for path in rotations.into_iter().take(excess) {
                if let Err(err) = fs::remove_file(&path) {
                    warn!(target: "notice", path = %path.display(), ?err, "failed to prune rotation");
                }
            }
        }
        Ok(())
    }

    fn buffer_stem(&self) -> String {
        self.buffer_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "notifications".into())
    }
}

fn encode_batch(notices: &[Notice]) -> AppResult<(Vec<Vec<u8>>, u64)> {
    let mut encoded = Vec::with_capacity(notices.len());
    let mut bytes = 0_u64;
    for notice in notices {
        let line = serde_json::to_vec(notice)?;
        bytes += (line.len() + 1) as u64;
        encoded.push(line);
    }
    Ok((encoded, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_notices_to_disk() {
        let dir = tempdir().unwrap();
        let center = NotificationCenter::with_limits(dir.path(), 1024, 3).unwrap();
        center.success("Export complete", "3 profiles written");
        center.error("Export failed", &AppError::Remote("500".into()));
        assert_eq!(center.queue_depth(), 2);
        center.flush().unwrap();
        assert_eq!(center.queue_depth(), 0);

        let buffer = fs::read_to_string(center.buffer_path()).unwrap();
        assert!(buffer.contains("Export complete"));
        assert!(buffer.contains("\"error_kind\":\"remote\""));
        assert_eq!(center.history().len(), 2);
    }

    #[test]
    fn keeps_buffer_across_instances() {
        let dir = tempdir().unwrap();
        {
            let center = NotificationCenter::with_limits(dir.path(), 1024, 3).unwrap();
            center.info("first", "");
            center.flush().unwrap();
        }

        let center = NotificationCenter::with_limits(dir.path(), 1024, 3).unwrap();
        center.info("second", "");
        center.flush().unwrap();

        let buffer = fs::read_to_string(center.buffer_path()).unwrap();
        assert!(buffer.contains("first"));
        assert!(buffer.contains("second"));
    }

    #[test]
    fn rotates_when_exceeding_capacity() {
        let dir = tempdir().unwrap();
        let center = NotificationCenter::with_limits(dir.path(), 64, 3).unwrap();
        for i in 0..4 {
            center.info("big", format!("0123456789abcdef0123456789abcdef {i}"));
            center.flush().unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let rotated = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("notifications-"))
            .count();
        assert!(rotated >= 1);
        assert!(rotated <= 2);
    }
}
