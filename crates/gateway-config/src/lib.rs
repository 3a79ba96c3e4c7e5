//! # Gateway Config
//!
//! Configuration loading for the completions gateway.
//!
//! Configuration is read from a YAML or TOML file (chosen by extension),
//! then overridden by `GATEWAY_*` environment variables, then validated.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod types;

pub use types::{
    ApiKeySeed, AuthSettings, GatewayConfig, LogFormat, LoggingSettings, MemoryStoreSeed,
    ModelSeed, PostgresSettings, ProjectSeed, ProviderConfig, ProviderKind, ServerSettings,
    StoreConfig,
};

use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

/// Config files probed when `GATEWAY_CONFIG` is unset
pub const DEFAULT_CONFIG_PATHS: [&str; 3] = ["gateway.yaml", "gateway.yml", "gateway.toml"];

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },
    /// YAML parse failure
    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// TOML parse failure
    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    /// Unsupported file extension
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
    /// Environment override could not be parsed
    #[error("Invalid value for {var}: {value}")]
    InvalidEnv {
        /// Variable name
        var: String,
        /// Offending value
        value: String,
    },
    /// Semantic validation failure
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for gateway_core::GatewayError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

/// Load configuration from `GATEWAY_CONFIG`, a default path, or defaults.
pub async fn load_config() -> Result<GatewayConfig, ConfigError> {
    let path = std::env::var(CONFIG_PATH_ENV).ok().or_else(|| {
        DEFAULT_CONFIG_PATHS
            .iter()
            .find(|p| Path::new(p).exists())
            .map(|p| (*p).to_string())
    });

    let mut config = match path {
        Some(path) => {
            info!(path = %path, "Loading configuration file");
            load_from_path(&path).await?
        }
        None => {
            info!("No configuration file found, using defaults");
            GatewayConfig::default()
        }
    };

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    config.validate()?;
    Ok(config)
}

/// Read and parse a config file without applying overrides
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<GatewayConfig, ConfigError> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    parse_config(&contents, &extension)
}

/// Parse config text in the given format (`yaml`, `yml` or `toml`)
pub fn parse_config(contents: &str, format: &str) -> Result<GatewayConfig, ConfigError> {
    match format {
        "yaml" | "yml" => Ok(serde_yaml::from_str(contents)?),
        "toml" => Ok(toml::from_str(contents)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// Apply `GATEWAY_HOST`, `GATEWAY_PORT`, `GATEWAY_LOG_LEVEL` and
/// `GATEWAY_LOG_FORMAT` overrides.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("GATEWAY_HOST") {
        debug!(host = %host, "Overriding host from environment");
        config.server.host = host;
    }

    if let Some(port) = lookup("GATEWAY_PORT") {
        config.server.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
            var: "GATEWAY_PORT".to_string(),
            value: port.clone(),
        })?;
    }

    if let Some(level) = lookup("GATEWAY_LOG_LEVEL") {
        config.logging.level = level;
    }

    if let Some(format) = lookup("GATEWAY_LOG_FORMAT") {
        config.logging.format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" | "text" => LogFormat::Pretty,
            _ => {
                return Err(ConfigError::InvalidEnv {
                    var: "GATEWAY_LOG_FORMAT".to_string(),
                    value: format,
                })
            }
        };
    }

    Ok(())
}

impl GatewayConfig {
    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".to_string()));
        }
        if self.server.stream_buffer == 0 {
            return Err(ConfigError::Invalid(
                "server.stream_buffer must be non-zero".to_string(),
            ));
        }

        let mut provider_ids = HashSet::new();
        for provider in &self.providers {
            if !provider_ids.insert(provider.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider id '{}'",
                    provider.id
                )));
            }
            url::Url::parse(&provider.base_url).map_err(|e| {
                ConfigError::Invalid(format!(
                    "provider '{}' has invalid base_url: {e}",
                    provider.id
                ))
            })?;
        }

        if let StoreConfig::Memory(seed) = &self.store {
            seed.validate()?;
        }

        Ok(())
    }
}

impl MemoryStoreSeed {
    fn validate(&self) -> Result<(), ConfigError> {
        let projects: HashSet<&str> = self.projects.iter().map(|p| p.id.as_str()).collect();
        let models: HashSet<&str> = self.models.iter().map(|m| m.id.as_str()).collect();

        for key in &self.api_keys {
            if key.key.is_none() && key.key_sha256.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "api key '{}' needs either key or key_sha256",
                    key.id
                )));
            }
            if !projects.contains(key.project_id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "api key '{}' references unknown project '{}'",
                    key.id, key.project_id
                )));
            }
            if let Some(model) = key.models.iter().find(|m| !models.contains(m.as_str())) {
                return Err(ConfigError::Invalid(format!(
                    "api key '{}' references unknown model '{model}'",
                    key.id
                )));
            }
        }

        Ok(())
    }
}
