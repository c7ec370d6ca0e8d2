//! Isolation policy applied to every containment run.
//!
//! The policy is fixed: networking is always disabled, a memory ceiling is
//! always set, the syscall allow-list document is always passed and every run
//! has a wall-clock timeout. Only the magnitudes are configurable.

pub mod install;
pub mod isolation;
pub mod seccomp;

pub use install::{install_root, installed_profile, INSTALL_ROOT_ENV, SECCOMP_PROFILE_FILE};
pub use isolation::{IsolationPolicy, MemoryLimit, NETWORK_MODE};
pub use seccomp::SeccompProfile;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Invalid memory limit '{value}': {reason}")]
    InvalidMemoryLimit { value: String, reason: String },
    #[error("Run timeout must be greater than zero")]
    ZeroTimeout,
    #[error("Syscall policy document {path} is unreadable: {source}")]
    ProfileUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Syscall policy document {path} is empty")]
    EmptyProfile { path: PathBuf },
    #[error("Cannot determine installation root: {source}")]
    InstallRootUnknown { source: std::io::Error },
}

impl PolicyError {
    pub fn code(&self) -> &'static str {
        match self {
            PolicyError::InvalidMemoryLimit { .. } => "WARDS_INVALID_MEMORY_LIMIT",
            PolicyError::ZeroTimeout => "WARDS_ZERO_TIMEOUT",
            PolicyError::ProfileUnreadable { .. } => "WARDS_PROFILE_UNREADABLE",
            PolicyError::EmptyProfile { .. } => "WARDS_PROFILE_EMPTY",
            PolicyError::InstallRootUnknown { .. } => "WARDS_INSTALL_ROOT_UNKNOWN",
        }
    }
}
