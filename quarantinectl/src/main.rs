use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "quarantinectl", version, about = "Quarantine and contain a flagged process")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Quarantine the artifact behind a running process and run it in isolation
    Analyze {
        /// Process to analyze
        #[arg(long)]
        pid: u32,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start a program, let it settle, then analyze it
    Launch {
        /// How long the program runs before analysis starts
        #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
        settle: Duration,
        #[arg(long)]
        json: bool,
        /// Program and arguments
        #[arg(last = true, required = true, value_name = "PROGRAM")]
        command: Vec<String>,
    },
    /// List supported file types and how each is run
    Profiles,
    /// Inspect the analysis configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
    /// Print version and exit
    Version,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration with defaults applied
    Show,
    /// Validate a configuration file against the schema
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Analyze { pid, json } => {
            let report = commands::analyze::run(pid, json)?;
            if report.is_aborted() {
                std::process::exit(1);
            }
        }
        Commands::Launch {
            settle,
            json,
            command,
        } => {
            let report = commands::analyze::launch(&command, settle, json)?;
            if report.is_aborted() {
                std::process::exit(1);
            }
        }
        Commands::Profiles => commands::profiles::run()?,
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Show => commands::config::show()?,
            ConfigCommands::Validate { file } => commands::config::validate(&file)?,
        },
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
    }
    Ok(())
}
