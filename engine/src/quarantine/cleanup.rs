use event_log::EventSink;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::QuarantineWorkspace;

/// Which original locations are deleted once their copies are quarantined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OriginalDisposition {
    #[default]
    PrimaryOnly,
    All,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SweepStatus {
    Removed,
    NotFound,
    PermissionDenied,
    OtherError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepEntry {
    pub path: PathBuf,
    pub status: SweepStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub entries: Vec<SweepEntry>,
}

impl CleanupReport {
    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(|e| {
            matches!(
                e.status,
                SweepStatus::PermissionDenied | SweepStatus::OtherError(_)
            )
        })
    }

    pub fn status_of(&self, path: &Path) -> Option<&SweepStatus> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| &e.status)
    }
}

/// Paths to sweep, in order: staged copies, originals, then the workspace.
///
/// Originals are only listed once the primary artifact was staged.
pub fn plan_cleanup(
    workspace: &QuarantineWorkspace,
    primary_original: Option<&Path>,
    disposition: OriginalDisposition,
) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = workspace.staged().to_vec();

    let primary_staged = primary_original.map_or(false, |p| workspace.is_staged(p));
    if primary_staged {
        match disposition {
            OriginalDisposition::PrimaryOnly => {
                paths.extend(primary_original.map(Path::to_path_buf));
            }
            OriginalDisposition::All => paths.extend(workspace.originals().iter().cloned()),
            OriginalDisposition::None => {}
        }
    }

    paths.push(workspace.dir().to_path_buf());
    paths
}

/// Delete every path independently. Never stops early and never fails.
pub fn sweep<I>(paths: I, sink: &dyn EventSink) -> CleanupReport
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut report = CleanupReport::default();
    for path in paths {
        if report.entries.iter().any(|e| e.path == path) {
            continue;
        }
        let status = match remove(&path) {
            Ok(()) => {
                sink.info(&format!("Removed: {}", path.display()));
                SweepStatus::Removed
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => SweepStatus::NotFound,
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                sink.warn(&format!(
                    "Permission denied when removing {}. Skipping...",
                    path.display()
                ));
                SweepStatus::PermissionDenied
            }
            Err(err) => {
                sink.error(&format!("Failed to delete {}: {}", path.display(), err));
                SweepStatus::OtherError(err.to_string())
            }
        };
        report.entries.push(SweepEntry { path, status });
    }
    report
}

fn remove(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_log::MemoryEventLog;

    #[test]
    fn duplicate_paths_are_swept_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.txt");
        fs::write(&file, "x").unwrap();

        let sink = MemoryEventLog::new();
        let report = sweep(vec![file.clone(), file.clone()], &sink);
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.status_of(&file), Some(&SweepStatus::Removed));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_removed_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("keep");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("inner.txt"), "x").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let report = sweep(vec![link.clone()], &MemoryEventLog::new());
        assert_eq!(report.status_of(&link), Some(&SweepStatus::Removed));
        assert!(target.join("inner.txt").exists());
    }

    #[test]
    fn disposition_uses_camel_case_names() {
        let parsed: OriginalDisposition = serde_json::from_str("\"primaryOnly\"").unwrap();
        assert_eq!(parsed, OriginalDisposition::PrimaryOnly);
        let parsed: OriginalDisposition = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(parsed, OriginalDisposition::None);
    }
}
