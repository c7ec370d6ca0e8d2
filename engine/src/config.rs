use config_loader::{ConfigError, ConfigManager};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;
use wards::{IsolationPolicy, MemoryLimit, PolicyError, SeccompProfile};

use crate::profiles::RuntimeKind;
use crate::quarantine::OriginalDisposition;

pub const CONFIG_NAME: &str = "quarantine";

/// Compiled-in copy of the configuration schema.
pub const CONFIG_SCHEMA: &str = include_str!("../../contracts/config/quarantine-config.v1.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnalysisConfig {
    pub base_image: String,
    pub workspace_root: PathBuf,
    pub container_runtime: String,
    pub memory_limit: String,
    pub pids_limit: u32,
    #[serde(with = "duration_str")]
    pub run_timeout: Duration,
    #[serde(with = "duration_str")]
    pub build_timeout: Duration,
    #[serde(with = "duration_str")]
    pub termination_grace: Duration,
    pub proceed_on_termination_failure: bool,
    pub original_disposition: OriginalDisposition,
    pub remove_image: bool,
    pub disabled_runtimes: Vec<RuntimeKind>,
    pub log_file: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_image: "alpine:latest".to_string(),
            workspace_root: PathBuf::from("/tmp"),
            container_runtime: "docker".to_string(),
            memory_limit: "256m".to_string(),
            pids_limit: 64,
            run_timeout: Duration::from_secs(10),
            build_timeout: Duration::from_secs(300),
            termination_grace: Duration::from_secs(3),
            proceed_on_termination_failure: true,
            original_disposition: OriginalDisposition::PrimaryOnly,
            remove_image: true,
            disabled_runtimes: Vec::new(),
            log_file: PathBuf::from("sandbox_log.txt"),
        }
    }
}

impl AnalysisConfig {
    /// A manager that falls back to the compiled-in schema.
    pub fn manager() -> ConfigManager {
        ConfigManager::new().with_embedded_schema(CONFIG_NAME, CONFIG_SCHEMA)
    }

    pub fn load(manager: &ConfigManager) -> Result<Self, ConfigError> {
        manager.load(CONFIG_NAME)
    }

    /// Build the fixed isolation policy from these settings.
    pub fn isolation_policy(&self, seccomp: SeccompProfile) -> Result<IsolationPolicy, PolicyError> {
        IsolationPolicy::new(
            MemoryLimit::parse(&self.memory_limit)?,
            seccomp,
            self.run_timeout,
            Some(self.pids_limit),
        )
    }
}

mod duration_str {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_schema_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dirs(dir.path().join("no-contracts"), dir.path().to_path_buf())
            .with_embedded_schema(CONFIG_NAME, CONFIG_SCHEMA);

        let loaded = AnalysisConfig::load(&manager).unwrap();
        assert_eq!(loaded, AnalysisConfig::default());
    }

    #[test]
    fn durations_round_trip_as_humantime() {
        let json = serde_json::to_value(AnalysisConfig::default()).unwrap();
        assert_eq!(json["runTimeout"], "10s");
        assert_eq!(json["buildTimeout"], "5m");

        let back: AnalysisConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.build_timeout, Duration::from_secs(300));
    }
}
