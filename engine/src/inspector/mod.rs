//! Process inspection and termination.

mod proc_fd;
mod system;

pub use system::SysinfoInspector;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::InspectError;

/// Resource figures recorded for the audit trail.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    pub start_time: Option<DateTime<Utc>>,
    /// Since the previous sample; a first sample reads 0.
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub virtual_memory_bytes: u64,
    /// Resident memory as a share of host memory.
    pub memory_percent: f32,
    pub threads: Option<usize>,
}

/// Point-in-time view of a process. Stale as soon as the process is signalled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    pub parent_pid: Option<u32>,
    pub exe_path: Option<PathBuf>,
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub status: String,
    pub open_files: Vec<PathBuf>,
    pub usage: ResourceUsage,
    pub live_at_capture: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum TerminationOutcome {
    Terminated,
    AlreadyExited,
    Failed { reason: String },
}

pub trait ProcessInspector: Send + Sync {
    fn snapshot(&self, pid: u32) -> Result<ProcessSnapshot, InspectError>;

    /// Send SIGTERM and wait up to `grace` for the process to go away. Never
    /// escalates to SIGKILL. A process that is already gone yields
    /// [`TerminationOutcome::AlreadyExited`].
    fn terminate(&self, pid: u32, grace: Duration) -> Result<TerminationOutcome, InspectError>;
}
