use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::{emit_tracing, EventSink, Level};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Failed to open audit log {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Render one audit line as `<timestamp> [<LEVEL>] <message>`.
pub fn format_line(ts: DateTime<Local>, level: Level, message: &str) -> String {
    format!("{} [{}] {}", ts.format("%Y-%m-%d %H:%M:%S,%3f"), level, message)
}

/// Append-only audit file. Every record is also mirrored to `tracing`.
#[derive(Debug)]
pub struct FileEventLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileEventLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LogError::Open {
                path: path.clone(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LogError::Open {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for FileEventLog {
    fn record(&self, level: Level, message: &str) {
        emit_tracing(level, message);

        let line = format_line(Local::now(), level, message);
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = writeln!(file, "{}", line) {
            tracing::warn!(path = %self.path.display(), error = %err, "audit log write failed");
        }
    }

    fn flush(&self) {
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = file.flush();
        let _ = file.sync_data();
    }
}

impl Drop for FileEventLog {
    fn drop(&mut self) {
        EventSink::flush(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_line_matches_audit_layout() {
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let line = format_line(ts, Level::Warning, "container timed out");
        assert_eq!(line, "2024-03-09 14:05:07,000 [WARNING] container timed out");
    }

    #[test]
    fn open_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/logs/audit.txt");
        let log = FileEventLog::open(&path).unwrap();
        log.info("hello");
        assert!(path.exists());
    }
}
