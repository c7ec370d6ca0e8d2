use anyhow::{Context, Result};
use config_loader::ConfigError;
use engine::config::CONFIG_NAME;
use engine::AnalysisConfig;
use std::path::Path;

pub fn show() -> Result<()> {
    let manager = AnalysisConfig::manager();
    let config =
        AnalysisConfig::load(&manager).context("Failed to load quarantine configuration")?;
    println!("# {}", manager.config_path(CONFIG_NAME).display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub fn validate(file: &Path) -> Result<()> {
    let manager = AnalysisConfig::manager();
    match manager.validate_config_file(CONFIG_NAME, file) {
        Ok(()) => {
            println!("✓ Valid configuration: {}", file.display());
            Ok(())
        }
        Err(ConfigError::ValidationFailed { errors }) => {
            eprintln!("✗ Invalid configuration: {}", file.display());
            for error in errors {
                let pointer = if error.json_pointer.is_empty() {
                    "(root)"
                } else {
                    error.json_pointer.as_str()
                };
                eprintln!("  {}: {}", pointer, error.message);
            }
            std::process::exit(1);
        }
        Err(other) => Err(other).context("Failed to validate configuration"),
    }
}
