use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Process configuration: which queue backend feeds which runner.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub queue: ComponentConfig,
    pub runner: ComponentConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// A named component plus its backend-specific block.
///
/// The block stays untyped here; the factory registered under `name`
/// decodes and validates it.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    pub name: String,
    #[serde(default)]
    pub config: serde_yaml::Value,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log_filter: Option<String>,
    #[serde(default)]
    pub otel_exporter_endpoint: Option<String>,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: None,
            otel_exporter_endpoint: None,
            service_name: default_service_name(),
            metrics_port: None,
        }
    }
}

fn default_service_name() -> String {
    "reprow".to_string()
}

impl Config {
    /// Read the YAML document at `path`, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_yaml(&raw)?;
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(endpoint) = env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            self.observability.otel_exporter_endpoint = Some(endpoint);
        }

        if let Ok(service_name) = env::var("SERVICE_NAME") {
            self.observability.service_name = service_name;
        }

        if let Ok(port) = env::var("METRICS_PORT") {
            let port = port.parse().map_err(|_| ConfigError::InvalidPort)?;
            self.observability.metrics_port = Some(port);
        }

        Ok(())
    }
}

/// Decode a component block into its typed configuration.
pub fn decode_block<T: DeserializeOwned>(
    component: &str,
    block: serde_yaml::Value,
) -> Result<T, ConfigError> {
    serde_yaml::from_value(block).map_err(|e| ConfigError::invalid(component, e))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Unknown queue backend '{0}'")]
    UnknownQueue(String),

    #[error("Unknown runner '{0}'")]
    UnknownRunner(String),

    #[error("{kind} '{name}' registered twice")]
    DuplicateRegistration { kind: &'static str, name: String },

    #[error("Invalid {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("Invalid port number")]
    InvalidPort,
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl ToString) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}
