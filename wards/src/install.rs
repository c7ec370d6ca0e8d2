use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::seccomp::SeccompProfile;
use crate::PolicyError;

pub const INSTALL_ROOT_ENV: &str = "QUARANTINE_HOME";
pub const SECCOMP_PROFILE_FILE: &str = "seccomp_profile.json";

static INSTALLED: OnceLock<SeccompProfile> = OnceLock::new();

/// Directory the tool is installed in: `QUARANTINE_HOME` when set, otherwise
/// the directory holding the running executable.
pub fn install_root() -> Result<PathBuf, PolicyError> {
    if let Ok(root) = env::var(INSTALL_ROOT_ENV) {
        if !root.trim().is_empty() {
            return Ok(PathBuf::from(root));
        }
    }

    let exe = env::current_exe().map_err(|source| PolicyError::InstallRootUnknown { source })?;
    exe.parent()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| PolicyError::InstallRootUnknown {
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "executable has no parent directory",
            ),
        })
}

/// The syscall policy shipped next to the installation. Loaded on first call
/// and reused for the life of the process.
pub fn installed_profile() -> Result<&'static SeccompProfile, PolicyError> {
    if let Some(profile) = INSTALLED.get() {
        return Ok(profile);
    }
    let profile = SeccompProfile::load(install_root()?.join(SECCOMP_PROFILE_FILE))?;
    Ok(INSTALLED.get_or_init(|| profile))
}
