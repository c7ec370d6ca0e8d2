//! Schema-validated JSON configuration.
//!
//! A named configuration `<name>` lives at `<config_dir>/<name>.json` and is
//! validated against `<contracts_dir>/config/<name>-config.v1.json`. Keys left
//! out of the file are filled from the schema's `default` values; when the file
//! is missing entirely the defaults alone are used.

use jsonschema::{Draft, JSONSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

pub const CONTRACTS_DIR_ENV: &str = "QUARANTINE_CONTRACTS_DIR";
pub const CONFIG_DIR_ENV: &str = "QUARANTINE_CONFIG_DIR";
const DEFAULT_CONFIG_DIR: &str = ".quarantine/config";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Schema not found for config: {name}")]
    SchemaNotFound { name: String },

    #[error("Config file not found: {path}")]
    ConfigFileNotFound { path: String },

    #[error("Schema compilation failed: {message}")]
    SchemaCompilationFailed { message: String },

    #[error("Config validation failed: {}", summarize(.errors))]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("JSON parsing failed: {message}")]
    JsonParsingFailed { message: String },

    #[error("IO error: {message}")]
    IoError { message: String },
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub json_pointer: String,
    pub message: String,
    pub schema_path: String,
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| {
            if e.json_pointer.is_empty() {
                e.message.clone()
            } else {
                format!("{}: {}", e.json_pointer, e.message)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub struct ConfigManager {
    contracts_dir: Option<PathBuf>,
    config_dir: PathBuf,
    embedded: HashMap<String, &'static str>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            contracts_dir: Self::find_contracts_dir(),
            config_dir: Self::find_config_dir(),
            embedded: HashMap::new(),
        }
    }

    pub fn with_dirs(contracts_dir: PathBuf, config_dir: PathBuf) -> Self {
        Self {
            contracts_dir: Some(contracts_dir),
            config_dir,
            embedded: HashMap::new(),
        }
    }

    /// Register a schema compiled into the binary. It is used whenever the
    /// contracts directory does not carry a schema of the same name.
    pub fn with_embedded_schema(mut self, name: &str, schema: &'static str) -> Self {
        self.embedded.insert(name.to_string(), schema);
        self
    }

    pub fn with_config_dir(mut self, config_dir: PathBuf) -> Self {
        self.config_dir = config_dir;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir.join(format!("{}.json", name))
    }

    fn find_contracts_dir() -> Option<PathBuf> {
        if let Ok(contracts_dir) = std::env::var(CONTRACTS_DIR_ENV) {
            let path = PathBuf::from(contracts_dir);
            if path.is_dir() {
                return Some(path);
            }
        }

        // Fall back to searching up the directory tree
        let mut current = std::env::current_dir().ok()?;
        loop {
            let contracts_path = current.join("contracts");
            if contracts_path.is_dir() {
                return Some(contracts_path);
            }
            if !current.pop() {
                break;
            }
        }
        None
    }

    fn find_config_dir() -> PathBuf {
        match std::env::var(CONFIG_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => PathBuf::from(DEFAULT_CONFIG_DIR),
        }
    }

    #[instrument(skip(self))]
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T, ConfigError> {
        let value = self.load_value(name)?;
        serde_json::from_value(value).map_err(|e| ConfigError::JsonParsingFailed {
            message: e.to_string(),
        })
    }

    /// Load the raw JSON for `name` with schema defaults applied and validated.
    pub fn load_value(&self, name: &str) -> Result<Value, ConfigError> {
        let schema = self.read_schema(name)?;
        let defaults = schema_defaults(&schema);

        let config_path = self.config_path(name);
        debug!("Loading config from: {:?}", config_path);

        let mut value = if config_path.exists() {
            read_json(&config_path)?
        } else {
            debug!("Config file not found, loading defaults from schema");
            Value::Object(Map::new())
        };

        apply_defaults(&mut value, &defaults);
        validate_against(&schema, &value)?;
        Ok(value)
    }

    #[instrument(skip(self))]
    pub fn validate_config_file(&self, name: &str, config_path: &Path) -> Result<(), ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::ConfigFileNotFound {
                path: config_path.to_string_lossy().to_string(),
            });
        }

        let value = read_json(config_path)?;
        self.validate_config_value(name, &value)
    }

    pub fn validate_config_value(&self, name: &str, value: &Value) -> Result<(), ConfigError> {
        let schema = self.read_schema(name)?;
        validate_against(&schema, value)
    }

    fn read_schema(&self, name: &str) -> Result<Value, ConfigError> {
        if let Some(dir) = &self.contracts_dir {
            let schema_path = dir.join("config").join(format!("{}-config.v1.json", name));
            if schema_path.exists() {
                return read_json(&schema_path);
            }
        }

        match self.embedded.get(name) {
            Some(raw) => serde_json::from_str(raw).map_err(|e| ConfigError::JsonParsingFailed {
                message: e.to_string(),
            }),
            None => Err(ConfigError::SchemaNotFound {
                name: name.to_string(),
            }),
        }
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn read_json(path: &Path) -> Result<Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        message: format!("Failed to read {}: {}", path.display(), e),
    })?;

    serde_json::from_str(&content).map_err(|e| ConfigError::JsonParsingFailed {
        message: format!("{}: {}", path.display(), e),
    })
}

fn schema_defaults(schema: &Value) -> Map<String, Value> {
    let mut defaults = Map::new();
    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, property) in properties {
            if let Some(default_value) = property.get("default") {
                defaults.insert(key.clone(), default_value.clone());
            }
        }
    }
    defaults
}

// Only top-level keys are defaulted; a non-object config is left for the
// schema to reject.
fn apply_defaults(value: &mut Value, defaults: &Map<String, Value>) {
    if let Value::Object(map) = value {
        for (key, default_value) in defaults {
            map.entry(key.clone())
                .or_insert_with(|| default_value.clone());
        }
    }
}

fn validate_against(schema: &Value, config: &Value) -> Result<(), ConfigError> {
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| ConfigError::SchemaCompilationFailed {
            message: e.to_string(),
        })?;

    if let Err(errors) = compiled.validate(config) {
        let validation_errors: Vec<ValidationError> = errors
            .map(|error| ValidationError {
                json_pointer: error.instance_path.to_string(),
                message: error.to_string(),
                schema_path: error.schema_path.to_string(),
            })
            .collect();

        return Err(ConfigError::ValidationFailed {
            errors: validation_errors,
        });
    }

    Ok(())
}
