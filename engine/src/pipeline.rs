use capsules_container_exec::{
    ContainerBackend, ContainmentExecutor, ContainmentResult, ExitOutcome,
};
use chrono::{DateTime, Utc};
use event_log::EventSink;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use wards::IsolationPolicy;

use crate::config::AnalysisConfig;
use crate::identify::{identify, secondary_candidates, ArtifactCandidate, CandidateSource};
use crate::inspector::{ProcessInspector, ProcessSnapshot, TerminationOutcome};
use crate::manifest::{synthesize, ManifestError};
use crate::profiles::{ProfileError, RuntimeKind, RuntimeProfile, RuntimeProfileRegistry};
use crate::quarantine::{plan_cleanup, sweep, CleanupReport, QuarantineWorkspace};
use crate::AnalysisError;

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AnalysisOutcome {
    Completed { silent: bool },
    TimedOut,
    Aborted(AnalysisError),
}

/// A secondary file that could not be copied into quarantine.
#[derive(Debug, Clone, Serialize)]
pub struct QuarantineFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub workspace_id: Option<String>,
    pub primary: Option<ArtifactCandidate>,
    pub secondary: Vec<ArtifactCandidate>,
    pub runtime: Option<RuntimeKind>,
    pub termination: Option<TerminationOutcome>,
    pub containment: Option<ContainmentResult>,
    pub outcome: AnalysisOutcome,
    pub cleanup: CleanupReport,
    pub quarantine_errors: Vec<QuarantineFailure>,
}

/// What an analysis has learned so far. It becomes an [`AnalysisReport`]
/// only once the outcome is known.
struct Progress {
    pid: u32,
    started_at: DateTime<Utc>,
    workspace_id: Option<String>,
    primary: Option<ArtifactCandidate>,
    secondary: Vec<ArtifactCandidate>,
    runtime: Option<RuntimeKind>,
    termination: Option<TerminationOutcome>,
    containment: Option<ContainmentResult>,
    quarantine_errors: Vec<QuarantineFailure>,
}

impl Progress {
    fn new(pid: u32) -> Self {
        Self {
            pid,
            started_at: Utc::now(),
            workspace_id: None,
            primary: None,
            secondary: Vec::new(),
            runtime: None,
            termination: None,
            containment: None,
            quarantine_errors: Vec::new(),
        }
    }

    fn into_report(self, outcome: AnalysisOutcome, cleanup: CleanupReport) -> AnalysisReport {
        AnalysisReport {
            pid: self.pid,
            started_at: self.started_at,
            workspace_id: self.workspace_id,
            primary: self.primary,
            secondary: self.secondary,
            runtime: self.runtime,
            termination: self.termination,
            containment: self.containment,
            outcome,
            cleanup,
            quarantine_errors: self.quarantine_errors,
        }
    }
}

impl AnalysisReport {
    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, AnalysisOutcome::Aborted(_))
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        match &self.outcome {
            AnalysisOutcome::Aborted(err) => Some(err),
            _ => None,
        }
    }
}

/// Runs one analysis end to end: inspect, identify, quarantine, terminate,
/// synthesize, build, run, clean up.
pub struct Analyzer {
    config: AnalysisConfig,
    policy: IsolationPolicy,
    registry: RuntimeProfileRegistry,
    inspector: Arc<dyn ProcessInspector>,
    executor: ContainmentExecutor,
    sink: Arc<dyn EventSink>,
}

impl Analyzer {
    pub fn new(
        config: AnalysisConfig,
        policy: IsolationPolicy,
        inspector: Arc<dyn ProcessInspector>,
        backend: Arc<dyn ContainerBackend>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let registry = RuntimeProfileRegistry::standard().without(&config.disabled_runtimes);
        let executor = ContainmentExecutor::new(backend, sink.clone())
            .with_build_timeout(config.build_timeout);
        Self {
            config,
            policy,
            registry,
            inspector,
            executor,
            sink,
        }
    }

    pub fn registry(&self) -> &RuntimeProfileRegistry {
        &self.registry
    }

    pub fn analyze(&self, pid: u32) -> AnalysisReport {
        let mut progress = Progress::new(pid);
        info!(pid, "analysis started");

        let snapshot = match self.inspector.snapshot(pid) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.sink.error(&format!("Process with PID {} not found: {}", pid, err));
                return self.abort(progress, AnalysisError::ProcessNotFound { pid });
            }
        };
        self.log_snapshot(&snapshot);

        let table = self.registry.extensions();
        let Some(primary) = identify(&snapshot, table) else {
            self.sink.error("Could not determine the main malicious file.");
            return self.abort(progress, AnalysisError::IdentificationFailed { pid });
        };
        self.sink.info(&format!(
            "Identified primary artifact {} ({:?})",
            primary.path.display(),
            primary.source
        ));
        let secondary = secondary_candidates(&snapshot, table, Some(primary.path.as_path()));
        // Only the paths survive past this point; the process is about to change.
        drop(snapshot);

        let mut workspace = match QuarantineWorkspace::create(&self.config.workspace_root) {
            Ok(workspace) => workspace,
            Err(source) => {
                self.sink.error(&format!(
                    "Failed to create quarantine workspace under {}: {}",
                    self.config.workspace_root.display(),
                    source
                ));
                return self.abort(
                    progress,
                    AnalysisError::Workspace {
                        path: self.config.workspace_root.clone(),
                        source,
                    },
                );
            }
        };
        progress.workspace_id = Some(workspace.id().to_string());
        self.sink.info(&format!(
            "Created quarantine workspace {}",
            workspace.dir().display()
        ));

        let outcome = self.contain(&mut progress, &mut workspace, primary, secondary);
        self.finish(progress, &workspace, outcome)
    }

    /// Everything between staging and the end of the container run. Returns
    /// the outcome; cleanup is the caller's job.
    fn contain(
        &self,
        progress: &mut Progress,
        workspace: &mut QuarantineWorkspace,
        primary: ArtifactCandidate,
        secondary: Vec<ArtifactCandidate>,
    ) -> AnalysisOutcome {
        let staged_primary = match workspace.stage(&primary.path) {
            Ok(dest) => {
                self.sink.info(&format!(
                    "Copied main artifact {} to quarantine.",
                    primary.path.display()
                ));
                dest
            }
            Err(source) => {
                self.sink.error(&format!(
                    "Error copying main artifact {}: {}",
                    primary.path.display(),
                    source
                ));
                let path = primary.path.clone();
                progress.primary = Some(primary);
                return AnalysisOutcome::Aborted(AnalysisError::CopyFailed { path, source });
            }
        };
        progress.primary = Some(primary.clone());

        for candidate in &secondary {
            match workspace.stage(&candidate.path) {
                Ok(_) => self.sink.info(&format!(
                    "Copied open file: {}",
                    candidate.path.display()
                )),
                Err(err) => {
                    self.sink.error(&format!(
                        "Error copying open file {}: {}",
                        candidate.path.display(),
                        err
                    ));
                    progress.quarantine_errors.push(QuarantineFailure {
                        path: candidate.path.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
        progress.secondary = secondary;

        let pid = progress.pid;
        let termination = match self.inspector.terminate(pid, self.config.termination_grace) {
            Ok(TerminationOutcome::Terminated) => {
                self.sink.info(&format!("Terminated process with PID {}", pid));
                TerminationOutcome::Terminated
            }
            Ok(TerminationOutcome::AlreadyExited) => {
                self.sink
                    .info(&format!("Process with PID {} had already exited.", pid));
                TerminationOutcome::AlreadyExited
            }
            Ok(TerminationOutcome::Failed { reason }) => TerminationOutcome::Failed { reason },
            Err(err) => TerminationOutcome::Failed {
                reason: err.to_string(),
            },
        };
        if let TerminationOutcome::Failed { reason } = &termination {
            self.sink
                .error(&format!("Failed to terminate process: {}", reason));
            if !self.config.proceed_on_termination_failure {
                let reason = reason.clone();
                progress.termination = Some(termination);
                return AnalysisOutcome::Aborted(AnalysisError::TerminationFailed { pid, reason });
            }
            self.sink.warn(
                "Continuing containment with the quarantined copy while the original process may still run.",
            );
        }
        progress.termination = Some(termination);

        let profile = match self.resolve_profile(&primary) {
            Ok(profile) => profile,
            Err(err) => {
                self.sink.error(&format!(
                    "Unsupported or unknown file type for {}: {}",
                    primary.path.display(),
                    err
                ));
                return AnalysisOutcome::Aborted(AnalysisError::UnsupportedType {
                    path: primary.path,
                    reason: err.to_string(),
                });
            }
        };
        progress.runtime = Some(profile.kind);
        self.sink
            .info(&format!("Detected file type: {}", profile.kind));

        let manifest = match synthesize(
            &staged_primary,
            profile,
            workspace.dir(),
            &self.config.base_image,
        ) {
            Ok(manifest) => manifest,
            Err(ManifestError::Io { path, source }) => {
                self.sink
                    .error(&format!("Failed to write Dockerfile: {}", source));
                return AnalysisOutcome::Aborted(AnalysisError::Workspace { path, source });
            }
            Err(err) => {
                self.sink
                    .error(&format!("Failed to write Dockerfile: {}", err));
                return AnalysisOutcome::Aborted(AnalysisError::UnsupportedType {
                    path: primary.path,
                    reason: err.to_string(),
                });
            }
        };
        self.sink.info("Dockerfile created.");

        let image_tag = format!("sandbox_image_{}", workspace.id());
        if let Err(source) = self
            .executor
            .build(workspace.dir(), &manifest.path, &image_tag)
        {
            return AnalysisOutcome::Aborted(AnalysisError::BuildFailed { source });
        }

        let result = self.executor.run(&image_tag, &self.policy);
        if self.config.remove_image {
            self.executor.remove_image(&image_tag);
        }

        let outcome = match result.outcome {
            ExitOutcome::Completed => AnalysisOutcome::Completed {
                silent: result.is_silent(),
            },
            ExitOutcome::TimedOut => AnalysisOutcome::TimedOut,
            ExitOutcome::ExecutionError => AnalysisOutcome::Aborted(AnalysisError::RunExecution {
                message: result
                    .error
                    .clone()
                    .unwrap_or_else(|| "container runtime failed".to_string()),
            }),
        };
        progress.containment = Some(result);
        outcome
    }

    /// Executable-path candidates always run as native binaries.
    fn resolve_profile(&self, candidate: &ArtifactCandidate) -> Result<&RuntimeProfile, ProfileError> {
        if candidate.source == CandidateSource::ExecutablePath {
            return self.registry.profile(RuntimeKind::Binary);
        }
        match &candidate.extension {
            Some(ext) => self.registry.lookup(ext),
            None => Err(ProfileError::UnknownExtension(
                candidate
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )),
        }
    }

    fn finish(
        &self,
        progress: Progress,
        workspace: &QuarantineWorkspace,
        outcome: AnalysisOutcome,
    ) -> AnalysisReport {
        let primary_original = progress.primary.as_ref().map(|c| c.path.as_path());
        let paths = plan_cleanup(workspace, primary_original, self.config.original_disposition);
        let cleanup = sweep(paths, self.sink.as_ref());
        if cleanup.has_failures() {
            self.sink
                .warn("Cleanup finished with failures; see the analysis report.");
        }
        let report = progress.into_report(outcome, cleanup);
        self.log_outcome(&report);
        report
    }

    fn abort(&self, progress: Progress, error: AnalysisError) -> AnalysisReport {
        let outcome = AnalysisOutcome::Aborted(error);
        let report = progress.into_report(outcome, CleanupReport::default());
        self.log_outcome(&report);
        report
    }

    fn log_outcome(&self, report: &AnalysisReport) {
        match &report.outcome {
            AnalysisOutcome::Completed { silent } => {
                info!(pid = report.pid, silent, "analysis completed")
            }
            AnalysisOutcome::TimedOut => info!(pid = report.pid, "analysis completed with timeout"),
            AnalysisOutcome::Aborted(err) => {
                warn!(pid = report.pid, code = err.code(), error = %err, "analysis aborted")
            }
        }
        self.sink.flush();
    }

    fn log_snapshot(&self, snapshot: &ProcessSnapshot) {
        let open_files: Vec<String> = snapshot
            .open_files
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        self.sink.info(&format!(
            "Process Information for PID {}: name={} parent={:?} exe={:?} args={:?} cwd={:?} status={} open_files={:?}",
            snapshot.pid,
            snapshot.name,
            snapshot.parent_pid,
            snapshot.exe_path,
            snapshot.argv,
            snapshot.cwd,
            snapshot.status,
            open_files
        ));

        let usage = &snapshot.usage;
        let started = usage
            .start_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        let threads = usage
            .threads
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        self.sink.info(&format!(
            "Process resources for PID {}: started={} cpu={:.1}% memory={} bytes ({:.2}%) virtual={} bytes threads={}",
            snapshot.pid,
            started,
            usage.cpu_percent,
            usage.memory_bytes,
            usage.memory_percent,
            usage.virtual_memory_bytes,
            threads
        ));
    }
}
