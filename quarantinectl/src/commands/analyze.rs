use anyhow::{bail, Context, Result};
use capsules_container_exec::CliBackend;
use engine::{AnalysisConfig, AnalysisOutcome, AnalysisReport, Analyzer, SysinfoInspector};
use event_log::{EventSink, FileEventLog};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Load everything an analysis needs. The syscall policy is checked first so
/// a broken installation fails before any process is touched.
fn analyzer() -> Result<(Analyzer, Arc<FileEventLog>)> {
    let seccomp = wards::installed_profile().context("Failed to load the seccomp profile")?;
    let root = wards::install_root().context("Failed to locate the install root")?;

    let config = AnalysisConfig::load(&AnalysisConfig::manager())
        .context("Failed to load quarantine configuration")?;

    let log_path = if config.log_file.is_absolute() {
        config.log_file.clone()
    } else {
        root.join(&config.log_file)
    };
    let sink = Arc::new(FileEventLog::open(&log_path)?);

    let policy = config
        .isolation_policy(seccomp.clone())
        .context("Invalid isolation settings")?;
    let backend = CliBackend::detect(&config.container_runtime);
    info!(runtime = backend.runtime(), log = %log_path.display(), "analyzer ready");

    let analyzer = Analyzer::new(
        config,
        policy,
        Arc::new(SysinfoInspector::new(sink.clone())),
        Arc::new(backend),
        sink.clone(),
    );
    Ok((analyzer, sink))
}

pub fn run(pid: u32, json: bool) -> Result<AnalysisReport> {
    let (analyzer, sink) = analyzer()?;
    let report = analyzer.analyze(pid);
    sink.flush();
    print_report(&report, json)?;
    Ok(report)
}

pub fn launch(command: &[String], settle: Duration, json: bool) -> Result<AnalysisReport> {
    let Some((program, args)) = command.split_first() else {
        bail!("No program given to launch");
    };
    let (analyzer, sink) = analyzer()?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to launch {}", program))?;
    let pid = child.id();
    sink.info(&format!("Launched {} as PID {}", program, pid));
    println!("Captured PID: {}", pid);

    thread::sleep(settle);
    let report = analyzer.analyze(pid);
    sink.flush();

    // Reap the child whether or not the analysis stopped it.
    match child.try_wait() {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!(pid, "launched process still running after analysis; killing it");
            let _ = child.kill();
            let _ = child.wait();
        }
        Err(err) => warn!(pid, error = %err, "could not poll launched process"),
    }

    print_report(&report, json)?;
    Ok(report)
}

fn print_report(report: &AnalysisReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    match &report.outcome {
        AnalysisOutcome::Completed { silent: false } => {
            println!("PID {}: completed", report.pid)
        }
        AnalysisOutcome::Completed { silent: true } => {
            println!("PID {}: completed without any output", report.pid)
        }
        AnalysisOutcome::TimedOut => println!(
            "PID {}: timed out; the artifact started but never exited",
            report.pid
        ),
        AnalysisOutcome::Aborted(err) => {
            eprintln!("PID {}: aborted [{}] {}", report.pid, err.code(), err)
        }
    }

    if let Some(id) = &report.workspace_id {
        println!("  workspace:   sandbox_{}", id);
    }
    if let Some(primary) = &report.primary {
        println!(
            "  artifact:    {} ({:?})",
            primary.path.display(),
            primary.source
        );
    }
    for candidate in &report.secondary {
        println!("  also held:   {}", candidate.path.display());
    }
    if let Some(kind) = report.runtime {
        println!("  type:        {}", kind);
    }
    if let Some(termination) = &report.termination {
        println!("  termination: {:?}", termination);
    }
    if let Some(result) = &report.containment {
        println!(
            "  container:   {:?} exit={:?} in {:.0} ms",
            result.outcome, result.exit_code, result.duration_ms
        );
        if !result.stdout.trim().is_empty() {
            println!("  stdout:\n{}", result.stdout.trim_end());
        }
        if !result.stderr.trim().is_empty() {
            println!("  stderr:\n{}", result.stderr.trim_end());
        }
    }
    for failure in &report.quarantine_errors {
        eprintln!(
            "  not quarantined: {} ({})",
            failure.path.display(),
            failure.message
        );
    }

    let failures = report
        .cleanup
        .entries
        .iter()
        .filter(|e| {
            !matches!(
                e.status,
                engine::SweepStatus::Removed | engine::SweepStatus::NotFound
            )
        })
        .count();
    println!(
        "  cleanup:     {} paths, {} failures",
        report.cleanup.entries.len(),
        failures
    );
    Ok(())
}
