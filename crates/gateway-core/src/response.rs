//! Provider response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token usage reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Tokens in the completion
    #[serde(default)]
    pub completion_tokens: u64,
    /// Total tokens
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    /// Create a usage figure set
    #[must_use]
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

/// A buffered provider response, relayed to the caller verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    /// Raw response body
    pub body: Value,
    /// Usage figures extracted from the body, if present
    pub usage: Option<Usage>,
}

impl ProviderResponse {
    /// Wrap a raw body, extracting an OpenAI-style `usage` object
    #[must_use]
    pub fn from_body(body: Value) -> Self {
        let usage = body
            .get("usage")
            .filter(|u| u.is_object())
            .and_then(|u| serde_json::from_value(u.clone()).ok());
        Self { body, usage }
    }
}
