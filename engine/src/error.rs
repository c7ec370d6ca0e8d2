use capsules_container_exec::ExecError;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a [`crate::ProcessInspector`].
#[derive(Debug, Error)]
pub enum InspectError {
    #[error("process {pid} not found")]
    NoSuchProcess { pid: u32 },
    #[error("process {pid} still running {grace:?} after SIGTERM")]
    TerminationTimedOut { pid: u32, grace: Duration },
    #[error("could not signal process {pid}: {reason}")]
    SignalFailed { pid: u32, reason: String },
}

/// Why an analysis stopped before producing a containment outcome.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("process with PID {pid} not found")]
    ProcessNotFound { pid: u32 },
    #[error("failed to terminate process {pid}: {reason}")]
    TerminationFailed { pid: u32, reason: String },
    #[error("could not determine the executing artifact of PID {pid}")]
    IdentificationFailed { pid: u32 },
    #[error("unsupported or unknown file type for {}: {reason}", path.display())]
    UnsupportedType { path: PathBuf, reason: String },
    #[error("failed to quarantine {}: {source}", path.display())]
    CopyFailed { path: PathBuf, source: io::Error },
    #[error("container image build failed: {source}")]
    BuildFailed { source: ExecError },
    #[error("container run failed: {message}")]
    RunExecution { message: String },
    #[error("workspace error at {}: {source}", path.display())]
    Workspace { path: PathBuf, source: io::Error },
}

impl AnalysisError {
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::ProcessNotFound { .. } => "ANALYSIS_PROCESS_NOT_FOUND",
            AnalysisError::TerminationFailed { .. } => "ANALYSIS_TERMINATION_FAILED",
            AnalysisError::IdentificationFailed { .. } => "ANALYSIS_IDENTIFICATION_FAILED",
            AnalysisError::UnsupportedType { .. } => "ANALYSIS_UNSUPPORTED_TYPE",
            AnalysisError::CopyFailed { .. } => "ANALYSIS_COPY_FAILED",
            AnalysisError::BuildFailed { .. } => "ANALYSIS_BUILD_FAILED",
            AnalysisError::RunExecution { .. } => "ANALYSIS_RUN_EXECUTION_ERROR",
            AnalysisError::Workspace { .. } => "ANALYSIS_WORKSPACE_ERROR",
        }
    }
}

impl Serialize for AnalysisError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AnalysisError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_code_and_message() {
        let err = AnalysisError::IdentificationFailed { pid: 42 };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "ANALYSIS_IDENTIFICATION_FAILED");
        assert_eq!(
            json["message"],
            "could not determine the executing artifact of PID 42"
        );
    }
}
