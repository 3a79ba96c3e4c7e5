//! Configuration types.

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

/// Top-level gateway configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server settings
    pub server: ServerSettings,
    /// Credential and header conventions
    pub auth: AuthSettings,
    /// Logging settings
    pub logging: LoggingSettings,
    /// Upstream providers
    pub providers: Vec<ProviderConfig>,
    /// Storage backend
    pub store: StoreConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Maximum accepted request body in bytes
    pub body_limit_bytes: usize,
    /// Time allowed for in-flight requests after a shutdown signal
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Capacity of the per-stream relay buffer, in chunks
    pub stream_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            body_limit_bytes: 10 * 1024 * 1024,
            shutdown_timeout: Duration::from_secs(30),
            stream_buffer: 64,
        }
    }
}

/// Header conventions for credentials and provider hints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Alternate header carrying the API key (Bearer auth is always accepted)
    pub api_key_header: String,
    /// Header carrying the explicit provider hint
    pub provider_header: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            api_key_header: "x-api-key".to_string(),
            provider_header: "x-llm-provider".to_string(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive (e.g. "info", "gateway_server=debug")
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Provider implementation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Any endpoint speaking the OpenAI chat completions protocol
    OpenaiCompatible,
}

/// Upstream provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Provider identifier, matched against `ModelConfig::provider`
    pub id: String,
    /// Implementation kind
    pub kind: ProviderKind,
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Inline API key
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Request timeout
    #[serde(default = "default_provider_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Whether the provider is registered
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ask the upstream to append a usage chunk to streams
    #[serde(default = "default_true")]
    pub stream_usage: bool,
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(120)
}

const fn default_true() -> bool {
    true
}

impl ProviderConfig {
    /// Resolve the API key from inline config or the environment
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<SecretString> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_ref()
                .and_then(|var| std::env::var(var).ok())
                .map(SecretString::new)
        })
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local store seeded from this file
    Memory(MemoryStoreSeed),
    /// PostgreSQL database
    Postgres(PostgresSettings),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory(MemoryStoreSeed::default())
    }
}

/// Seed data for the in-memory store
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryStoreSeed {
    /// Projects and their token ceilings
    pub projects: Vec<ProjectSeed>,
    /// Model records
    pub models: Vec<ModelSeed>,
    /// API keys and the models they may use
    pub api_keys: Vec<ApiKeySeed>,
}

/// Project seed
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSeed {
    /// Project identifier
    pub id: String,
    /// Total token ceiling, unlimited when absent
    #[serde(default)]
    pub token_limit: Option<u64>,
}

/// Model seed
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSeed {
    /// Model record identifier
    pub id: String,
    /// Model name requested by callers
    pub name: String,
    /// Provider identifier
    pub provider: String,
}

/// API key seed
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySeed {
    /// Credential identifier
    pub id: String,
    /// Project billed
    pub project_id: String,
    /// Owning account
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Plain secret (hashed on load)
    #[serde(default)]
    pub key: Option<SecretString>,
    /// SHA-256 hex digest of the secret
    #[serde(default)]
    pub key_sha256: Option<String>,
    /// Authorized model record ids, in preference order
    #[serde(default)]
    pub models: Vec<String>,
}

/// PostgreSQL settings
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresSettings {
    /// Connection URL
    pub url: SecretString,
    /// Pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Time to wait for a pooled connection
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

const fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(5)
}
