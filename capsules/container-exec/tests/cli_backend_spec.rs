#![cfg(unix)]

use capsules_container_exec::{
    CliBackend, ContainerBackend, ContainmentExecutor, ExecError, ExitOutcome, RUNTIME_ENV,
};
use event_log::{Level, MemoryEventLog};
use serial_test::serial;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wards::{IsolationPolicy, MemoryLimit, SeccompProfile};

struct FakeRuntime {
    dir: TempDir,
    script: PathBuf,
    calls: PathBuf,
}

impl FakeRuntime {
    /// A shell script standing in for the docker client. Every invocation
    /// appends its argument vector to `calls.log`, then runs `body`.
    fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-docker");
        let calls = dir.path().join("calls.log");
        let text = format!(
            "#!/bin/sh\necho \"$@\" >> '{}'\n{}\n",
            calls.display(),
            body
        );
        fs::write(&script, text).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, script, calls }
    }

    fn backend(&self) -> CliBackend {
        CliBackend::new(self.script.to_string_lossy())
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(&self.calls)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn policy(&self, timeout: Duration) -> IsolationPolicy {
        let profile = self.dir.path().join("seccomp_profile.json");
        fs::write(&profile, r#"{"defaultAction":"SCMP_ACT_ERRNO"}"#).unwrap();
        IsolationPolicy::new(
            MemoryLimit::parse("256m").unwrap(),
            SeccompProfile::load(&profile).unwrap(),
            timeout,
            Some(64),
        )
        .unwrap()
    }
}

fn executor(runtime: &FakeRuntime) -> (ContainmentExecutor, Arc<MemoryEventLog>) {
    let sink = Arc::new(MemoryEventLog::new());
    let executor = ContainmentExecutor::new(Arc::new(runtime.backend()), sink.clone());
    (executor, sink)
}

#[test]
#[serial]
fn completed_run_keeps_streams_separate() {
    let runtime = FakeRuntime::new(
        "case \"$1\" in run) echo hello; echo oops >&2; exit 3;; esac\nexit 0",
    );
    let (executor, sink) = executor(&runtime);

    let result = executor.run("sandbox_image_a", &runtime.policy(Duration::from_secs(10)));

    assert_eq!(result.outcome, ExitOutcome::Completed);
    assert_eq!(result.exit_code, Some(3));
    assert_eq!(result.stdout, "hello\n");
    assert_eq!(result.stderr, "oops\n");
    assert!(!result.is_silent());
    assert!(sink.contains(Level::Info, "Container executed successfully."));
    assert!(sink.contains(Level::Info, "Output:\nhello"));
    assert!(sink.contains(Level::Warning, "Errors:\noops"));

    let calls = runtime.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].starts_with("run --rm --name sandbox_image_a-run"));
    assert!(calls[0].contains("--network none"));
    assert!(calls[0].ends_with("sandbox_image_a"));
}

#[test]
#[serial]
fn silent_completion_is_flagged() {
    let runtime = FakeRuntime::new("exit 0");
    let (executor, sink) = executor(&runtime);

    let result = executor.run("sandbox_image_b", &runtime.policy(Duration::from_secs(10)));

    assert_eq!(result.outcome, ExitOutcome::Completed);
    assert!(result.is_silent());
    assert!(sink.contains(
        Level::Warning,
        "No output received: process might be a silent infinite loop."
    ));
}

#[test]
#[serial]
fn timeout_reports_partial_output_and_discards_container() {
    let runtime = FakeRuntime::new(
        "case \"$1\" in run) echo partial; exec sleep 5;; esac\nexit 0",
    );
    let (executor, sink) = executor(&runtime);

    let result = executor.run(
        "sandbox_image_c",
        &runtime.policy(Duration::from_millis(500)),
    );

    assert_eq!(result.outcome, ExitOutcome::TimedOut);
    assert_eq!(result.exit_code, None);
    assert_eq!(result.stdout, "partial\n");
    assert!(result.duration_ms < 5000.0);
    assert!(sink.contains(Level::Warning, "timed out"));
    assert!(runtime
        .calls()
        .iter()
        .any(|c| c == "rm -f sandbox_image_c-run"));
}

#[test]
#[serial]
fn engine_failure_exit_is_execution_error() {
    let runtime = FakeRuntime::new("echo 'docker: image not found' >&2\nexit 125");
    let (executor, sink) = executor(&runtime);

    let result = executor.run("sandbox_image_d", &runtime.policy(Duration::from_secs(10)));

    assert_eq!(result.outcome, ExitOutcome::ExecutionError);
    assert_eq!(result.exit_code, Some(125));
    assert!(result
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("image not found"));
    assert!(sink.contains(Level::Error, "Error running container"));
}

#[test]
#[serial]
fn program_exiting_125_on_its_own_is_completed() {
    let runtime = FakeRuntime::new(
        "case \"$1\" in run) echo 'all done'; exit 125;; esac\nexit 0",
    );
    let (executor, sink) = executor(&runtime);

    let result = executor.run("sandbox_image_d2", &runtime.policy(Duration::from_secs(10)));

    assert_eq!(result.outcome, ExitOutcome::Completed);
    assert_eq!(result.exit_code, Some(125));
    assert_eq!(result.error, None);
    assert!(sink.contains(Level::Info, "Container executed successfully."));
}

#[test]
#[serial]
fn run_timeout_holds_when_the_client_has_children() {
    // No exec: the sleep is a child of the client and shares its pipes.
    let runtime = FakeRuntime::new(
        "case \"$1\" in run) echo partial; sleep 6; echo after;; esac\nexit 0",
    );
    let (executor, _sink) = executor(&runtime);

    let started = Instant::now();
    let result = executor.run(
        "sandbox_image_c2",
        &runtime.policy(Duration::from_millis(500)),
    );
    let elapsed = started.elapsed();

    assert_eq!(result.outcome, ExitOutcome::TimedOut);
    assert_eq!(result.stdout, "partial\n");
    assert!(elapsed < Duration::from_secs(4), "run took {elapsed:?}");
    assert!(runtime
        .calls()
        .iter()
        .any(|c| c == "rm -f sandbox_image_c2-run"));
}

#[test]
#[serial]
fn build_timeout_holds_when_the_client_has_children() {
    let runtime = FakeRuntime::new("case \"$1\" in build) sleep 6;; esac\nexit 0");
    let (executor, _sink) = executor(&runtime);
    let executor = executor.with_build_timeout(Duration::from_millis(300));
    let context = runtime.dir.path();
    let manifest = context.join("Dockerfile");
    fs::write(&manifest, "FROM alpine:latest\n").unwrap();

    let started = Instant::now();
    let err = executor
        .build(context, &manifest, "sandbox_image_g2")
        .unwrap_err();

    assert_eq!(err.code(), "CONTAINER_EXEC_BUILD_TIMEOUT");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
#[serial]
fn missing_runtime_binary_is_execution_error() {
    let sink = Arc::new(MemoryEventLog::new());
    let executor = ContainmentExecutor::new(
        Arc::new(CliBackend::new("/nonexistent/quarantine-runtime")),
        sink.clone(),
    );
    let runtime = FakeRuntime::new("exit 0");

    let result = executor.run("sandbox_image_e", &runtime.policy(Duration::from_secs(1)));

    assert_eq!(result.outcome, ExitOutcome::ExecutionError);
    assert!(result
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("/nonexistent/quarantine-runtime"));
}

#[test]
#[serial]
fn build_failure_carries_runtime_stderr() {
    let runtime = FakeRuntime::new(
        "case \"$1\" in build) echo 'no space left on device' >&2; exit 1;; esac\nexit 0",
    );
    let (executor, sink) = executor(&runtime);
    let context = runtime.dir.path();
    let manifest = context.join("Dockerfile");
    fs::write(&manifest, "FROM alpine:latest\n").unwrap();

    let err = executor
        .build(context, &manifest, "sandbox_image_f")
        .unwrap_err();

    match &err {
        ExecError::BuildFailed { status, stderr, .. } => {
            assert_eq!(*status, Some(1));
            assert!(stderr.contains("no space left on device"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.code(), "CONTAINER_EXEC_BUILD_FAILED");
    assert!(sink.contains(Level::Error, "Container image build failed"));

    let calls = runtime.calls();
    assert_eq!(
        calls[0],
        format!(
            "build --tag sandbox_image_f --file {} {}",
            manifest.display(),
            context.display()
        )
    );
}

#[test]
#[serial]
fn build_timeout_is_distinct() {
    let runtime = FakeRuntime::new("exec sleep 5");
    let (executor, _sink) = executor(&runtime);
    let executor = executor.with_build_timeout(Duration::from_millis(300));
    let context = runtime.dir.path();
    let manifest = context.join("Dockerfile");
    fs::write(&manifest, "FROM alpine:latest\n").unwrap();

    let err = executor
        .build(context, &manifest, "sandbox_image_g")
        .unwrap_err();

    assert_eq!(err.code(), "CONTAINER_EXEC_BUILD_TIMEOUT");
}

#[test]
#[serial]
fn discard_tolerates_missing_container() {
    let runtime = FakeRuntime::new("echo 'Error: No such container: x' >&2\nexit 1");
    assert!(runtime.backend().discard("x").is_ok());

    let runtime = FakeRuntime::new("echo 'daemon unreachable' >&2\nexit 1");
    let err = runtime.backend().discard("x").unwrap_err();
    assert_eq!(err.code(), "CONTAINER_EXEC_HOUSEKEEPING_ERROR");
}

#[test]
#[serial]
fn remove_image_failure_is_only_logged() {
    let runtime = FakeRuntime::new("exit 1");
    let (executor, sink) = executor(&runtime);

    executor.remove_image("sandbox_image_h");

    assert!(sink.contains(Level::Warning, "Failed to remove container image sandbox_image_h"));
    assert_eq!(runtime.calls(), vec!["image rm -f sandbox_image_h".to_string()]);
}

#[test]
#[serial]
fn runtime_env_overrides_configured_binary() {
    std::env::set_var(RUNTIME_ENV, "podman");
    let detected = CliBackend::detect("docker");
    std::env::remove_var(RUNTIME_ENV);

    assert_eq!(detected.runtime(), "podman");
    assert_eq!(CliBackend::detect("docker").runtime(), "docker");
}

