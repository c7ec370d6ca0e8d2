use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use wards::IsolationPolicy;

use crate::ExecError;

/// Inputs for an image build. The context directory is the quarantine
/// workspace; the manifest lives inside it.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub context_dir: &'a Path,
    pub manifest_path: &'a Path,
    pub image_tag: &'a str,
    pub timeout: Duration,
}

/// Inputs for one isolated run of a previously built image.
#[derive(Debug, Clone, Copy)]
pub struct RunRequest<'a> {
    pub image_tag: &'a str,
    pub container_name: &'a str,
    pub policy: &'a IsolationPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The runtime client exited; `None` when it was ended by a signal.
    Exited(Option<i32>),
    TimedOut,
}

/// One captured output stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Captured {
    pub text: String,
    pub truncated: bool,
}

impl Captured {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            truncated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub status: RunStatus,
    pub stdout: Captured,
    pub stderr: Captured,
}

/// Capability to build and run images under an isolation policy.
///
/// Requests are structured; implementations must pass every value as a
/// discrete argument and never assemble a shell string.
pub trait ContainerBackend: Send + Sync {
    fn build(&self, request: &BuildRequest<'_>) -> Result<(), ExecError>;

    /// Run to completion or until `request.policy.timeout()` elapses. On
    /// timeout the call returns `RunStatus::TimedOut`; the container itself may
    /// still exist and must be released with [`ContainerBackend::discard`].
    fn run(&self, request: &RunRequest<'_>) -> Result<RunOutput, ExecError>;

    /// Force-remove a container and everything it holds. Succeeds when the
    /// container is already gone.
    fn discard(&self, container_name: &str) -> Result<(), ExecError>;

    fn remove_image(&self, image_tag: &str) -> Result<(), ExecError>;
}
