//! Account-side domain types: credentials, authorized models, limits and
//! usage records.
//!
//! These are owned by the storage collaborator; the gateway reads them per
//! request and never caches them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A verified API key credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Credential identifier
    pub id: String,
    /// Project the key bills against
    pub project_id: String,
    /// Owning account
    pub owner_id: String,
    /// Display name of the key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A model a credential is authorized to use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model record identifier
    pub id: String,
    /// Model name as requested by callers (e.g. "gpt-4o")
    pub name: String,
    /// Provider identifier used to look up completion functions
    pub provider: String,
}

impl ModelConfig {
    /// Create a model configuration
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider: provider.into(),
        }
    }
}

/// Outcome of a limit calculation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitCheckResult {
    /// Whether the account may not dispatch further completions
    pub has_reached_limit: bool,
    /// Tokens consumed in the current window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<u64>,
    /// Ceiling for the current window, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl LimitCheckResult {
    /// A result with no ceiling configured
    #[must_use]
    pub fn unlimited(used: u64) -> Self {
        Self {
            has_reached_limit: false,
            used: Some(used),
            limit: None,
        }
    }

    /// Compare consumption against a ceiling
    #[must_use]
    pub fn against(used: u64, limit: u64) -> Self {
        Self {
            has_reached_limit: used >= limit,
            used: Some(used),
            limit: Some(limit),
        }
    }
}

/// Normalized token accounting for one completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Project billed
    pub project_id: String,
    /// Credential used
    pub api_key_id: String,
    /// Model record used
    pub model_id: String,
    /// Prompt tokens
    pub prompt_tokens: u64,
    /// Completion tokens
    pub completion_tokens: u64,
    /// Total tokens
    pub total_tokens: u64,
}

/// Hash an API key secret for storage and lookup
#[must_use]
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
