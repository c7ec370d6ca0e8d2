use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;
use wait_timeout::ChildExt;

use crate::backend::{Captured, RunStatus};

/// Upper bound kept per output stream. Bytes past the limit are drained and
/// dropped so the child never blocks on a full pipe.
pub const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// How long the readers get to reach end-of-stream once the client is gone.
/// A descendant that escaped the process group can hold a pipe open forever;
/// past this point whatever was read so far is returned.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

pub(crate) struct Finished {
    pub status: RunStatus,
    pub stdout: Captured,
    pub stderr: Captured,
}

#[derive(Default)]
struct Bounded {
    kept: Vec<u8>,
    truncated: bool,
}

impl Bounded {
    fn push(&mut self, chunk: &[u8]) {
        let room = MAX_CAPTURE_BYTES.saturating_sub(self.kept.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.kept.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn snapshot(&self) -> Captured {
        Captured {
            text: String::from_utf8_lossy(&self.kept).into_owned(),
            truncated: self.truncated,
        }
    }
}

struct Reader {
    buffer: Arc<Mutex<Bounded>>,
    done: Receiver<io::Result<()>>,
}

impl Reader {
    fn spawn<R: Read + Send + 'static>(stream: Option<R>) -> Option<Self> {
        let stream = stream?;
        let buffer = Arc::new(Mutex::new(Bounded::default()));
        let (tx, done) = mpsc::channel();
        let shared = buffer.clone();
        thread::spawn(move || {
            let _ = tx.send(drain(stream, &shared));
        });
        Some(Self { buffer, done })
    }

    /// Wait for end-of-stream until `deadline`, then take what was read.
    fn collect(self, deadline: Instant) -> io::Result<Captured> {
        let wait = deadline.saturating_duration_since(Instant::now());
        match self.done.recv_timeout(wait) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                warn!("output stream still open after the client exited; keeping partial capture")
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "output reader thread panicked",
                ))
            }
        }
        let captured = match self.buffer.lock() {
            Ok(guard) => guard.snapshot(),
            Err(poisoned) => poisoned.into_inner().snapshot(),
        };
        Ok(captured)
    }
}

pub(crate) fn run_with_timeout(mut command: Command, timeout: Duration) -> io::Result<Finished> {
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    isolate_group(&mut command);

    let mut child = command.spawn()?;

    let stdout = Reader::spawn(child.stdout.take());
    let stderr = Reader::spawn(child.stderr.take());

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => RunStatus::Exited(status.code()),
        Ok(None) => {
            kill_tree(&mut child);
            RunStatus::TimedOut
        }
        Err(err) => {
            kill_tree(&mut child);
            return Err(err);
        }
    };

    let deadline = Instant::now() + DRAIN_GRACE;
    let stdout = collect(stdout, deadline)?;
    let stderr = collect(stderr, deadline)?;

    Ok(Finished {
        status,
        stdout,
        stderr,
    })
}

fn collect(reader: Option<Reader>, deadline: Instant) -> io::Result<Captured> {
    match reader {
        Some(reader) => reader.collect(deadline),
        None => Ok(Captured::default()),
    }
}

fn drain<R: Read>(mut reader: R, buffer: &Mutex<Bounded>) -> io::Result<()> {
    let mut buf = [0u8; 8192];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        match buffer.lock() {
            Ok(mut guard) => guard.push(&buf[..n]),
            Err(poisoned) => poisoned.into_inner().push(&buf[..n]),
        }
    }
}

/// The client leads its own process group so a timeout can take down any
/// plugin or wrapper it started along with it.
#[cfg(unix)]
fn isolate_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn isolate_group(_command: &mut Command) {}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    // The group id equals the leader's pid.
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: killpg only sends a signal; it touches no memory.
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc != 0 {
            warn!(pgid, error = %io::Error::last_os_error(), "killpg failed; killing client only");
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
