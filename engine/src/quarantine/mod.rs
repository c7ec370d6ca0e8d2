//! Per-analysis staging directory for quarantined copies.

mod cleanup;

pub use cleanup::{plan_cleanup, sweep, CleanupReport, OriginalDisposition, SweepEntry, SweepStatus};

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::manifest::MANIFEST_FILE;

#[derive(Debug)]
pub struct QuarantineWorkspace {
    id: String,
    dir: PathBuf,
    staged: Vec<PathBuf>,
    originals: Vec<PathBuf>,
    taken: HashSet<OsString>,
}

impl QuarantineWorkspace {
    /// Create `<root>/sandbox_<id>`. Fails rather than reuse an existing directory.
    pub fn create(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let id = Uuid::new_v4().simple().to_string();
        let dir = root.join(format!("sandbox_{}", id));
        fs::create_dir(&dir)?;

        let mut taken = HashSet::new();
        taken.insert(OsString::from(MANIFEST_FILE));
        Ok(Self {
            id,
            dir,
            staged: Vec::new(),
            originals: Vec::new(),
            taken,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every destination a copy was attempted to, including failed ones.
    pub fn staged(&self) -> &[PathBuf] {
        &self.staged
    }

    /// Source locations whose copy completed.
    pub fn originals(&self) -> &[PathBuf] {
        &self.originals
    }

    pub fn is_staged(&self, original: &Path) -> bool {
        self.originals.iter().any(|p| p == original)
    }

    /// Copy `source` into the workspace, keeping content and permission bits.
    ///
    /// The destination is recorded before the copy starts so a partial copy is
    /// still swept.
    pub fn stage(&mut self, source: &Path) -> io::Result<PathBuf> {
        let name = source.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", source.display()),
            )
        })?;
        let claimed = self.claim_name(name);
        let dest = self.dir.join(claimed);
        self.staged.push(dest.clone());

        fs::copy(source, &dest)?;
        self.originals.push(source.to_path_buf());
        Ok(dest)
    }

    /// Remove the directory and everything in it. A missing directory is fine.
    pub fn destroy(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn claim_name(&mut self, name: &OsStr) -> OsString {
        let base = OsString::from(safe_name(name));
        let mut candidate = base.clone();
        let mut n = 1u32;
        while self.taken.contains(&candidate) {
            candidate = OsString::from(format!("{}_", n));
            candidate.push(&base);
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

/// Base name restricted to characters that are inert in a manifest and on a
/// command line. Anything else becomes `_`; a leading `-` is prefixed so the
/// name is never read as an option.
fn safe_name(name: &OsStr) -> String {
    let mut out: String = name
        .to_string_lossy()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.starts_with('-') {
        out.insert(0, '_');
    }
    if out.chars().all(|c| c == '.') {
        out = format!("_{}", out);
    }
    out
}
