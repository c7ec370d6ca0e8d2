//! Picks the file a flagged process is actually running.
//!
//! Rules, first match wins:
//! 1. an argument after the program name that carries a recognized extension
//!    and resolves (against the process cwd) to a regular file;
//! 2. the executable itself, when it lives outside the system directories;
//! 3. the first open regular file inside the working directory.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::inspector::ProcessSnapshot;
use crate::profiles::ExtensionTable;

const SYSTEM_DIRS: [&str; 3] = ["/usr", "/bin", "/lib"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CandidateSource {
    OpenFileScan,
    ArgvMatch,
    ExecutablePath,
    OpenFileFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactCandidate {
    pub path: PathBuf,
    pub source: CandidateSource,
    pub extension: Option<String>,
}

impl ArtifactCandidate {
    fn new(path: PathBuf, source: CandidateSource, table: &ExtensionTable) -> Self {
        let extension = table.match_path(&path).map(|(ext, _)| ext.to_string());
        Self {
            path,
            source,
            extension,
        }
    }
}

pub fn identify(snapshot: &ProcessSnapshot, table: &ExtensionTable) -> Option<ArtifactCandidate> {
    from_argv(snapshot, table)
        .or_else(|| from_executable(snapshot, table))
        .or_else(|| from_open_files(snapshot, table))
}

/// Open files with a recognized extension, excluding `primary`, each listed once.
pub fn secondary_candidates(
    snapshot: &ProcessSnapshot,
    table: &ExtensionTable,
    primary: Option<&Path>,
) -> Vec<ArtifactCandidate> {
    let mut seen: Vec<&Path> = Vec::new();
    let mut candidates = Vec::new();
    for file in &snapshot.open_files {
        let file = file.as_path();
        if Some(file) == primary || seen.contains(&file) {
            continue;
        }
        seen.push(file);
        if table.match_path(file).is_some() {
            candidates.push(ArtifactCandidate::new(
                file.to_path_buf(),
                CandidateSource::OpenFileScan,
                table,
            ));
        }
    }
    candidates
}

fn from_argv(snapshot: &ProcessSnapshot, table: &ExtensionTable) -> Option<ArtifactCandidate> {
    snapshot.argv.iter().skip(1).find_map(|arg| {
        let cleaned = arg.trim_matches(&[' ', '"', '\''][..]);
        let (ext, _) = table.match_name(cleaned)?;
        let resolved = resolve(cleaned, snapshot.cwd.as_deref())?;
        resolved.is_file().then(|| ArtifactCandidate {
            path: resolved,
            source: CandidateSource::ArgvMatch,
            extension: Some(ext.to_string()),
        })
    })
}

fn resolve(arg: &str, cwd: Option<&Path>) -> Option<PathBuf> {
    let path = Path::new(arg);
    if path.is_absolute() {
        Some(path.to_path_buf())
    } else {
        cwd.map(|cwd| cwd.join(path))
    }
}

fn from_executable(
    snapshot: &ProcessSnapshot,
    table: &ExtensionTable,
) -> Option<ArtifactCandidate> {
    let exe = snapshot.exe_path.as_ref()?;
    if is_system_path(exe) || !exe.is_file() {
        return None;
    }
    Some(ArtifactCandidate::new(
        exe.clone(),
        CandidateSource::ExecutablePath,
        table,
    ))
}

fn is_system_path(path: &Path) -> bool {
    SYSTEM_DIRS.iter().any(|dir| path.starts_with(dir))
}

fn from_open_files(
    snapshot: &ProcessSnapshot,
    table: &ExtensionTable,
) -> Option<ArtifactCandidate> {
    let cwd = snapshot.cwd.as_deref()?;
    snapshot
        .open_files
        .iter()
        .find(|file| file.starts_with(cwd) && file.is_file())
        .map(|file| ArtifactCandidate::new(file.clone(), CandidateSource::OpenFileFallback, table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_directories_compare_by_component() {
        assert!(is_system_path(Path::new("/usr/bin/python3")));
        assert!(is_system_path(Path::new("/lib/ld-musl.so")));
        assert!(!is_system_path(Path::new("/usrlocal/evil")));
        assert!(!is_system_path(Path::new("/tmp/evil_bin")));
    }

    #[test]
    fn relative_argument_without_cwd_is_unresolvable() {
        assert_eq!(resolve("payload.py", None), None);
        assert_eq!(
            resolve("/abs/payload.py", None),
            Some(PathBuf::from("/abs/payload.py"))
        );
    }
}
