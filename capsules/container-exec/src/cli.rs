use std::env;
use std::ffi::OsString;
use std::process::Command;
use std::time::Duration;
use tracing::debug;

use crate::backend::{BuildRequest, ContainerBackend, RunOutput, RunRequest, RunStatus};
use crate::capture::run_with_timeout;
use crate::ExecError;

pub const RUNTIME_ENV: &str = "QUARANTINE_CONTAINER_RUNTIME";

const HOUSEKEEPING_TIMEOUT: Duration = Duration::from_secs(60);

/// Backend driving an OCI-compatible CLI (`docker`, `podman`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliBackend {
    runtime_bin: String,
}

impl CliBackend {
    pub fn new(runtime_bin: impl Into<String>) -> Self {
        Self {
            runtime_bin: runtime_bin.into(),
        }
    }

    /// Use `QUARANTINE_CONTAINER_RUNTIME` when set, otherwise `configured`.
    pub fn detect(configured: &str) -> Self {
        match env::var(RUNTIME_ENV) {
            Ok(val) if !val.trim().is_empty() => Self::new(val.trim()),
            _ => Self::new(configured),
        }
    }

    pub fn runtime(&self) -> &str {
        &self.runtime_bin
    }

    pub(crate) fn build_args(request: &BuildRequest<'_>) -> Vec<OsString> {
        vec![
            "build".into(),
            "--tag".into(),
            request.image_tag.into(),
            "--file".into(),
            request.manifest_path.into(),
            request.context_dir.into(),
        ]
    }

    pub(crate) fn run_args(request: &RunRequest<'_>) -> Vec<OsString> {
        let policy = request.policy;
        let mut args: Vec<OsString> = vec![
            "run".into(),
            "--rm".into(),
            "--name".into(),
            request.container_name.into(),
            "--pull".into(),
            "never".into(),
            "--network".into(),
            policy.network_mode().into(),
            "--memory".into(),
            policy.memory_limit().as_arg().into(),
            "--security-opt".into(),
            policy.seccomp().security_opt().into(),
            "--security-opt".into(),
            "no-new-privileges".into(),
        ];
        if let Some(pids) = policy.pids_limit() {
            args.push("--pids-limit".into());
            args.push(pids.to_string().into());
        }
        args.push(request.image_tag.into());
        args
    }

    fn command(&self, args: Vec<OsString>) -> Command {
        let mut command = Command::new(&self.runtime_bin);
        command.args(args);
        command
    }

    fn spawn_error(&self, source: std::io::Error) -> ExecError {
        ExecError::RuntimeSpawn {
            runtime: self.runtime_bin.clone(),
            source,
        }
    }
}

impl ContainerBackend for CliBackend {
    fn build(&self, request: &BuildRequest<'_>) -> Result<(), ExecError> {
        let mut command = self.command(Self::build_args(request));
        command.current_dir(request.context_dir);
        debug!(runtime = %self.runtime_bin, tag = request.image_tag, "image build starting");

        let finished =
            run_with_timeout(command, request.timeout).map_err(|e| self.spawn_error(e))?;

        match finished.status {
            RunStatus::Exited(Some(0)) => Ok(()),
            RunStatus::Exited(code) => Err(ExecError::BuildFailed {
                image_tag: request.image_tag.to_string(),
                status: code,
                stderr: finished.stderr.text,
            }),
            RunStatus::TimedOut => Err(ExecError::BuildTimedOut {
                image_tag: request.image_tag.to_string(),
                timeout_secs: request.timeout.as_secs(),
            }),
        }
    }

    fn run(&self, request: &RunRequest<'_>) -> Result<RunOutput, ExecError> {
        let command = self.command(Self::run_args(request));
        debug!(
            runtime = %self.runtime_bin,
            container = request.container_name,
            timeout_ms = request.policy.timeout().as_millis() as u64,
            "container run starting"
        );

        let finished = run_with_timeout(command, request.policy.timeout())
            .map_err(|e| self.spawn_error(e))?;

        Ok(RunOutput {
            status: finished.status,
            stdout: finished.stdout,
            stderr: finished.stderr,
        })
    }

    fn discard(&self, container_name: &str) -> Result<(), ExecError> {
        let command = self.command(vec!["rm".into(), "-f".into(), container_name.into()]);
        let finished =
            run_with_timeout(command, HOUSEKEEPING_TIMEOUT).map_err(|e| self.spawn_error(e))?;

        match finished.status {
            RunStatus::Exited(Some(0)) => Ok(()),
            _ if finished
                .stderr
                .text
                .to_ascii_lowercase()
                .contains("no such container") =>
            {
                Ok(())
            }
            status => Err(ExecError::Housekeeping {
                action: format!("rm -f {}", container_name),
                message: describe(status, &finished.stderr.text),
            }),
        }
    }

    fn remove_image(&self, image_tag: &str) -> Result<(), ExecError> {
        let command = self.command(vec![
            "image".into(),
            "rm".into(),
            "-f".into(),
            image_tag.into(),
        ]);
        let finished =
            run_with_timeout(command, HOUSEKEEPING_TIMEOUT).map_err(|e| self.spawn_error(e))?;

        match finished.status {
            RunStatus::Exited(Some(0)) => Ok(()),
            status => Err(ExecError::Housekeeping {
                action: format!("image rm -f {}", image_tag),
                message: describe(status, &finished.stderr.text),
            }),
        }
    }
}

fn describe(status: RunStatus, stderr: &str) -> String {
    let head = match status {
        RunStatus::Exited(Some(code)) => format!("exited with code {}", code),
        RunStatus::Exited(None) => "terminated by signal".to_string(),
        RunStatus::TimedOut => "timed out".to_string(),
    };
    let stderr = stderr.trim();
    if stderr.is_empty() {
        head
    } else {
        format!("{}: {}", head, stderr)
    }
}
