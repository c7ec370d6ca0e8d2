//! Builds a quarantined artifact into an image and runs it under a fixed
//! isolation policy.
//!
//! The executor never talks to a container runtime directly. It drives a
//! [`ContainerBackend`], maps what the backend reports onto the three
//! containment outcomes and writes the audit trail through an
//! [`EventSink`].

mod backend;
mod capture;
mod cli;

pub use backend::{BuildRequest, Captured, ContainerBackend, RunOutput, RunRequest, RunStatus};
pub use capture::MAX_CAPTURE_BYTES;
pub use cli::{CliBackend, RUNTIME_ENV};

use event_log::EventSink;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use wards::IsolationPolicy;

/// Exit code the docker and podman clients use when the engine itself failed
/// before the contained program started. A contained program can exit with
/// the same code, so it only counts together with a runtime-style message.
pub const RUNTIME_FAILURE_EXIT: i32 = 125;

const RUNTIME_ERROR_PREFIXES: [&str; 4] = [
    "docker:",
    "podman:",
    "Error response from daemon",
    "Error:",
];

pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExitOutcome {
    Completed,
    TimedOut,
    ExecutionError,
}

/// What one isolated run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainmentResult {
    pub outcome: ExitOutcome,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContainmentResult {
    /// A program that ran to completion without writing anything.
    pub fn is_silent(&self) -> bool {
        self.outcome == ExitOutcome::Completed && self.stdout.is_empty() && self.stderr.is_empty()
    }

    fn execution_error(message: String, started: Instant) -> Self {
        Self {
            outcome: ExitOutcome::ExecutionError,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            duration_ms: elapsed_ms(started),
            error: Some(message),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("image build for {image_tag} failed (status {status:?}): {stderr}")]
    BuildFailed {
        image_tag: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("image build for {image_tag} exceeded {timeout_secs}s")]
    BuildTimedOut { image_tag: String, timeout_secs: u64 },
    #[error("failed to spawn container runtime '{runtime}': {source}")]
    RuntimeSpawn {
        runtime: String,
        source: std::io::Error,
    },
    #[error("runtime housekeeping '{action}' failed: {message}")]
    Housekeeping { action: String, message: String },
    #[error("invalid container request: {message}")]
    InvalidRequest { message: String },
}

impl ExecError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecError::BuildFailed { .. } => "CONTAINER_EXEC_BUILD_FAILED",
            ExecError::BuildTimedOut { .. } => "CONTAINER_EXEC_BUILD_TIMEOUT",
            ExecError::RuntimeSpawn { .. } => "CONTAINER_EXEC_RUNTIME_ERROR",
            ExecError::Housekeeping { .. } => "CONTAINER_EXEC_HOUSEKEEPING_ERROR",
            ExecError::InvalidRequest { .. } => "CONTAINER_EXEC_INVALID_REQUEST",
        }
    }
}

pub struct ContainmentExecutor {
    backend: Arc<dyn ContainerBackend>,
    sink: Arc<dyn EventSink>,
    build_timeout: Duration,
}

impl ContainmentExecutor {
    pub fn new(backend: Arc<dyn ContainerBackend>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            backend,
            sink,
            build_timeout: DEFAULT_BUILD_TIMEOUT,
        }
    }

    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    /// Build `image_tag` from the manifest, using `context_dir` as the build
    /// context.
    pub fn build(
        &self,
        context_dir: &Path,
        manifest_path: &Path,
        image_tag: &str,
    ) -> Result<(), ExecError> {
        validate_tag(image_tag)?;
        self.sink.info(&format!(
            "Building container image {} from {}",
            image_tag,
            manifest_path.display()
        ));

        let request = BuildRequest {
            context_dir,
            manifest_path,
            image_tag,
            timeout: self.build_timeout,
        };
        match self.backend.build(&request) {
            Ok(()) => {
                self.sink
                    .info(&format!("Container image {} built.", image_tag));
                Ok(())
            }
            Err(err) => {
                self.sink
                    .error(&format!("Container image build failed: {}", err));
                Err(err)
            }
        }
    }

    /// Run a built image once under `policy`. Never fails: runtime failures
    /// come back as [`ExitOutcome::ExecutionError`].
    pub fn run(&self, image_tag: &str, policy: &IsolationPolicy) -> ContainmentResult {
        let started = Instant::now();
        if let Err(err) = validate_tag(image_tag) {
            self.sink.error(&format!("Container run refused: {}", err));
            return ContainmentResult::execution_error(err.to_string(), started);
        }

        let container_name = format!("{}-run", image_tag);
        let request = RunRequest {
            image_tag,
            container_name: &container_name,
            policy,
        };

        self.sink.info(&format!(
            "Running container {} (network={}, memory={}, timeout={}s)",
            container_name,
            policy.network_mode(),
            policy.memory_limit(),
            policy.timeout().as_secs_f64()
        ));

        let output = match self.backend.run(&request) {
            Ok(output) => output,
            Err(err) => {
                self.sink
                    .error(&format!("Error running container: {}", err));
                return ContainmentResult::execution_error(err.to_string(), started);
            }
        };

        let result = self.classify(output, started);
        if result.outcome == ExitOutcome::TimedOut {
            self.release(&container_name);
        }
        result
    }

    fn classify(&self, output: RunOutput, started: Instant) -> ContainmentResult {
        let (outcome, exit_code, error) = match output.status {
            RunStatus::TimedOut => (ExitOutcome::TimedOut, None, None),
            RunStatus::Exited(Some(RUNTIME_FAILURE_EXIT))
                if has_runtime_signature(&output.stderr.text) =>
            {
                (
                    ExitOutcome::ExecutionError,
                    Some(RUNTIME_FAILURE_EXIT),
                    Some(format!(
                        "container runtime failed before start: {}",
                        output.stderr.text.trim()
                    )),
                )
            }
            RunStatus::Exited(None) => (
                ExitOutcome::ExecutionError,
                None,
                Some("container runtime client was terminated by a signal".to_string()),
            ),
            RunStatus::Exited(Some(code)) => (ExitOutcome::Completed, Some(code), None),
        };

        let result = ContainmentResult {
            outcome,
            exit_code,
            stdout: output.stdout.text,
            stderr: output.stderr.text,
            stdout_truncated: output.stdout.truncated,
            stderr_truncated: output.stderr.truncated,
            duration_ms: elapsed_ms(started),
            error,
        };
        self.report(&result);
        result
    }

    fn report(&self, result: &ContainmentResult) {
        match result.outcome {
            ExitOutcome::Completed => {
                self.sink.info("Container executed successfully.");
                if !result.stdout.trim().is_empty() {
                    self.sink.info(&format!("Output:\n{}", result.stdout));
                }
                if !result.stderr.trim().is_empty() {
                    self.sink.warn(&format!("Errors:\n{}", result.stderr));
                }
                if result.stdout_truncated || result.stderr_truncated {
                    self.sink.warn(&format!(
                        "Captured output truncated at {} bytes per stream.",
                        MAX_CAPTURE_BYTES
                    ));
                }
                if result.is_silent() {
                    self.sink.warn(
                        "No output received: process might be a silent infinite loop.",
                    );
                }
                info!(exit_code = ?result.exit_code, duration_ms = result.duration_ms, "containment completed");
            }
            ExitOutcome::TimedOut => {
                self.sink.warn(
                    "Container execution timed out: process might be an infinite loop.",
                );
                if !result.stdout.trim().is_empty() {
                    self.sink
                        .info(&format!("Partial output:\n{}", result.stdout));
                }
                warn!(duration_ms = result.duration_ms, "containment timed out");
            }
            ExitOutcome::ExecutionError => {
                let reason = result.error.as_deref().unwrap_or("unknown runtime failure");
                self.sink
                    .error(&format!("Error running container: {}", reason));
            }
        }
    }

    fn release(&self, container_name: &str) {
        match self.backend.discard(container_name) {
            Ok(()) => debug!(container = container_name, "timed out container discarded"),
            Err(err) => self.sink.warn(&format!(
                "Failed to discard timed out container {}: {}",
                container_name, err
            )),
        }
    }

    /// Best effort: a failure is logged and otherwise ignored.
    pub fn remove_image(&self, image_tag: &str) {
        match self.backend.remove_image(image_tag) {
            Ok(()) => self
                .sink
                .info(&format!("Removed container image {}", image_tag)),
            Err(err) => self.sink.warn(&format!(
                "Failed to remove container image {}: {}",
                image_tag, err
            )),
        }
    }
}

fn validate_tag(tag: &str) -> Result<(), ExecError> {
    let valid = !tag.is_empty()
        && tag.len() <= 128
        && tag
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ExecError::InvalidRequest {
            message: format!("'{}' is not a valid image tag", tag),
        })
    }
}

fn has_runtime_signature(stderr: &str) -> bool {
    stderr.lines().any(|line| {
        let line = line.trim_start();
        RUNTIME_ERROR_PREFIXES
            .iter()
            .any(|prefix| line.starts_with(prefix))
    })
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
