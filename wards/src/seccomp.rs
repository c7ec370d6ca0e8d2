use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::PolicyError;

/// Handle on the external syscall allow-list. The document's content is opaque
/// here: it is checked to be readable and non-empty, then its path is handed to
/// the container runtime unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeccompProfile {
    path: PathBuf,
    len: u64,
}

impl SeccompProfile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let unreadable = |source| PolicyError::ProfileUnreadable {
            path: path.to_path_buf(),
            source,
        };

        let canonical = fs::canonicalize(path).map_err(unreadable)?;
        let bytes = fs::read(&canonical).map_err(unreadable)?;
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(PolicyError::EmptyProfile { path: canonical });
        }

        tracing::debug!(path = %canonical.display(), bytes = bytes.len(), "syscall policy loaded");

        Ok(Self {
            path: canonical,
            len: bytes.len() as u64,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value for `--security-opt`.
    pub fn security_opt(&self) -> String {
        format!("seccomp={}", self.path.display())
    }
}
