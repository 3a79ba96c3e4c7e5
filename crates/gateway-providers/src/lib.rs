//! # Gateway Providers
//!
//! Upstream completion providers and the table the dispatcher looks them up in.
//!
//! Every configured provider id is bound to an implementation kind. Today the
//! only kind is [`OpenAICompatibleProvider`], which covers OpenAI and the many
//! vendors exposing the same chat completions protocol (Mistral, Groq,
//! Together, vLLM, Ollama, ...).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod openai;
pub mod registry;

pub use openai::{OpenAICompatibleConfig, OpenAICompatibleProvider};
pub use registry::{ProviderEntry, ProviderTable};

use gateway_core::GatewayError;

/// Errors raised while building providers
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Invalid provider settings
    #[error("Invalid provider configuration: {0}")]
    Configuration(String),

    /// Models reference providers with no registered functions
    #[error("No provider registered for: {}", .0.join(", "))]
    UnknownProviders(Vec<String>),

    /// HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl From<ProviderError> for GatewayError {
    fn from(err: ProviderError) -> Self {
        Self::configuration(err.to_string())
    }
}
