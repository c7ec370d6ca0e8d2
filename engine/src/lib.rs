//! Quarantine and containment of a flagged process.
//!
//! [`Analyzer::analyze`] drives one analysis: snapshot the process, pick the
//! artifact it runs, copy it into a fresh workspace, stop the process, build
//! a minimal image for the artifact and run it under the fixed
//! [`wards::IsolationPolicy`]. Cleanup runs on every path out.

pub mod config;
pub mod error;
pub mod identify;
pub mod inspector;
pub mod manifest;
pub mod pipeline;
pub mod profiles;
pub mod quarantine;

pub use config::AnalysisConfig;
pub use error::{AnalysisError, InspectError};
pub use identify::{identify, secondary_candidates, ArtifactCandidate, CandidateSource};
pub use inspector::{
    ProcessInspector, ProcessSnapshot, ResourceUsage, SysinfoInspector, TerminationOutcome,
};
pub use manifest::{synthesize, BuildManifest, ManifestError};
pub use pipeline::{AnalysisOutcome, AnalysisReport, Analyzer, QuarantineFailure};
pub use profiles::{
    ExtensionTable, ProfileError, RuntimeKind, RuntimeProfile, RuntimeProfileRegistry,
};
pub use quarantine::{
    plan_cleanup, sweep, CleanupReport, OriginalDisposition, QuarantineWorkspace, SweepEntry,
    SweepStatus,
};
