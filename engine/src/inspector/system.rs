use chrono::{TimeZone, Utc};
use event_log::EventSink;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, Signal, System};
use tracing::debug;

use super::proc_fd::{open_regular_files, thread_count};
use super::{ProcessInspector, ProcessSnapshot, ResourceUsage, TerminationOutcome};
use crate::InspectError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Host inspector backed by `sysinfo` and `/proc`.
pub struct SysinfoInspector {
    sink: Arc<dyn EventSink>,
    poll_interval: Duration,
}

impl SysinfoInspector {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Whether the process still exists and has not been reaped or zombied.
    fn is_running(system: &mut System, pid: Pid) -> bool {
        system.refresh_process_specifics(pid, ProcessRefreshKind::new())
            && system
                .process(pid)
                .map_or(false, |process| !has_exited(process.status()))
    }
}

fn has_exited(status: ProcessStatus) -> bool {
    matches!(status, ProcessStatus::Zombie | ProcessStatus::Dead)
}

fn usage_of(process: &Process, total_memory: u64) -> ResourceUsage {
    let start_time = match i64::try_from(process.start_time()) {
        Ok(secs) if secs > 0 => Utc.timestamp_opt(secs, 0).single(),
        _ => None,
    };
    let memory_percent = if total_memory == 0 {
        0.0
    } else {
        (process.memory() as f64 / total_memory as f64 * 100.0) as f32
    };
    let threads = process
        .tasks()
        .map(|tasks| tasks.len())
        .filter(|count| *count > 0)
        .or_else(|| thread_count(process.pid().as_u32()).ok());

    ResourceUsage {
        start_time,
        cpu_percent: process.cpu_usage(),
        memory_bytes: process.memory(),
        virtual_memory_bytes: process.virtual_memory(),
        memory_percent,
        threads,
    }
}

impl ProcessInspector for SysinfoInspector {
    fn snapshot(&self, pid: u32) -> Result<ProcessSnapshot, InspectError> {
        let sys_pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_memory();
        if !system.refresh_process_specifics(sys_pid, ProcessRefreshKind::everything()) {
            return Err(InspectError::NoSuchProcess { pid });
        }
        let process = system
            .process(sys_pid)
            .ok_or(InspectError::NoSuchProcess { pid })?;

        let open_files = match open_regular_files(pid) {
            Ok(files) => files,
            Err(err) => {
                self.sink.warn(&format!(
                    "Could not read open files of PID {}: {}",
                    pid, err
                ));
                Vec::new()
            }
        };

        let status = process.status();
        Ok(ProcessSnapshot {
            pid,
            name: process.name().to_string(),
            parent_pid: process.parent().map(|p| p.as_u32()),
            exe_path: process.exe().map(|p| p.to_path_buf()),
            argv: process.cmd().to_vec(),
            cwd: process.cwd().map(|p| p.to_path_buf()),
            status: format!("{:?}", status),
            open_files,
            usage: usage_of(process, system.total_memory()),
            live_at_capture: !has_exited(status),
        })
    }

    fn terminate(&self, pid: u32, grace: Duration) -> Result<TerminationOutcome, InspectError> {
        let sys_pid = Pid::from_u32(pid);
        let mut system = System::new();
        if !Self::is_running(&mut system, sys_pid) {
            return Ok(TerminationOutcome::AlreadyExited);
        }

        let delivered = system
            .process(sys_pid)
            .and_then(|process| process.kill_with(Signal::Term));
        match delivered {
            Some(true) => debug!(pid, "SIGTERM delivered"),
            Some(false) => {
                if !Self::is_running(&mut system, sys_pid) {
                    return Ok(TerminationOutcome::AlreadyExited);
                }
                return Err(InspectError::SignalFailed {
                    pid,
                    reason: "SIGTERM was rejected".to_string(),
                });
            }
            None => {
                return Err(InspectError::SignalFailed {
                    pid,
                    reason: "SIGTERM is not supported on this platform".to_string(),
                })
            }
        }

        let deadline = Instant::now() + grace;
        loop {
            if !Self::is_running(&mut system, sys_pid) {
                return Ok(TerminationOutcome::Terminated);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(InspectError::TerminationTimedOut { pid, grace });
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}
