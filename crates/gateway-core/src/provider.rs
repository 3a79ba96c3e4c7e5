//! Provider seams.
//!
//! A provider exposes up to two completion functions: a buffered one that
//! returns the whole response body, and a streaming one that returns the raw
//! byte chunks of the provider's event stream. The gateway is agnostic to
//! everything beyond these two shapes.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::request::{ChatMessage, CompletionRequest};
use crate::response::{ProviderResponse, Usage};

/// Byte chunks relayed from a provider stream
pub type ByteStream = BoxStream<'static, Result<Bytes, GatewayError>>;

/// Invoked by a streaming provider once final usage figures are known.
///
/// Providers may call it zero, one or several times per stream; callers must
/// not assume exactly-once delivery.
pub type UsageCallback = Arc<dyn Fn(Usage) + Send + Sync>;

/// Response mode of a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionMode {
    /// Single JSON response
    Buffered,
    /// Server-sent event stream
    Streaming,
}

impl std::fmt::Display for CompletionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered => write!(f, "buffered"),
            Self::Streaming => write!(f, "streaming"),
        }
    }
}

/// Parameters handed to a provider
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    /// Conversation to complete
    pub messages: Vec<ChatMessage>,
    /// Resolved model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Optional completion token cap
    pub max_tokens: Option<u32>,
}

impl CompletionParams {
    /// Build provider parameters from a validated request and a resolved model name
    #[must_use]
    pub fn from_request(request: CompletionRequest, model: impl Into<String>) -> Self {
        Self {
            messages: request.messages,
            model: model.into(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

/// Buffered completion function of a provider
#[async_trait]
pub trait BufferedCompletion: Send + Sync {
    /// Run a completion and return the provider's full response
    async fn complete(&self, params: CompletionParams) -> Result<ProviderResponse, GatewayError>;
}

/// Streaming completion function of a provider
#[async_trait]
pub trait StreamingCompletion: Send + Sync {
    /// Open a completion stream.
    ///
    /// Each item is one chunk of provider payload, relayed to the caller in
    /// arrival order. `on_usage` must not be awaited by the stream.
    async fn complete_stream(
        &self,
        params: CompletionParams,
        on_usage: UsageCallback,
    ) -> Result<ByteStream, GatewayError>;
}
