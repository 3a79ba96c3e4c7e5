//! OpenAI-compatible provider implementation.
//!
//! Speaks `POST {base_url}/chat/completions`. Buffered responses are relayed
//! verbatim; streamed events are relayed as their raw `data` payloads.

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use gateway_config::ProviderConfig;
use gateway_core::{
    BufferedCompletion, ByteStream, ChatMessage, CompletionParams, GatewayError,
    ProviderResponse, StreamingCompletion, Usage, UsageCallback,
};
use reqwest::{Client, RequestBuilder};
use reqwest_eventsource::{Event, EventSource};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

use crate::ProviderError;

/// Marker sent by OpenAI-style streams after the last chunk
const STREAM_DONE: &str = "[DONE]";

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone)]
pub struct OpenAICompatibleConfig {
    /// Provider id
    pub id: String,
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Bearer token
    pub api_key: Option<SecretString>,
    /// Request timeout
    pub timeout: Duration,
    /// Request a trailing usage chunk on streams
    pub stream_usage: bool,
}

impl OpenAICompatibleConfig {
    /// Create a configuration with default timeout and stream usage enabled
    #[must_use]
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(120),
            stream_usage: true,
        }
    }

    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(api_key.into()));
        self
    }

    /// Enable or disable `stream_options.include_usage`
    #[must_use]
    pub fn with_stream_usage(mut self, enabled: bool) -> Self {
        self.stream_usage = enabled;
        self
    }
}

impl From<&ProviderConfig> for OpenAICompatibleConfig {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            id: config.id.clone(),
            base_url: config.base_url.clone(),
            api_key: config.resolve_api_key(),
            timeout: config.timeout,
            stream_usage: config.stream_usage,
        }
    }
}

/// Provider for endpoints speaking the OpenAI chat completions protocol
#[derive(Debug, Clone)]
pub struct OpenAICompatibleProvider {
    config: OpenAICompatibleConfig,
    client: Client,
    completions_url: String,
}

impl OpenAICompatibleProvider {
    /// Create a new provider
    pub fn new(config: OpenAICompatibleConfig) -> Result<Self, ProviderError> {
        url::Url::parse(&config.base_url).map_err(|e| {
            ProviderError::Configuration(format!("provider '{}' base_url: {e}", config.id))
        })?;

        let client = Client::builder().timeout(config.timeout).build()?;
        let completions_url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            config,
            client,
            completions_url,
        })
    }

    fn request(&self, body: &ChatCompletionBody<'_>) -> RequestBuilder {
        let builder = self.client.post(&self.completions_url).json(body);
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }

    fn body<'a>(&self, params: &'a CompletionParams, stream: bool) -> ChatCompletionBody<'a> {
        ChatCompletionBody {
            model: &params.model,
            messages: &params.messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream,
            stream_options: (stream && self.config.stream_usage).then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }
}

#[async_trait]
impl BufferedCompletion for OpenAICompatibleProvider {
    async fn complete(&self, params: CompletionParams) -> Result<ProviderResponse, GatewayError> {
        debug!(provider = %self.config.id, model = %params.model, "Sending completion request");

        let response = self
            .request(&self.body(&params, false))
            .send()
            .await
            .map_err(|e| GatewayError::provider(&self.config.id, format!("Request failed: {e}"), None))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                provider = %self.config.id,
                status = %status,
                body = %body,
                "Provider returned an error"
            );
            return Err(GatewayError::provider(
                &self.config.id,
                format!("Upstream returned {status}"),
                Some(status.as_u16()),
            ));
        }

        let body: Value = response.json().await.map_err(|e| {
            GatewayError::provider(&self.config.id, format!("Failed to parse response: {e}"), None)
        })?;

        Ok(ProviderResponse::from_body(body))
    }
}

#[async_trait]
impl StreamingCompletion for OpenAICompatibleProvider {
    async fn complete_stream(
        &self,
        params: CompletionParams,
        on_usage: UsageCallback,
    ) -> Result<ByteStream, GatewayError> {
        debug!(provider = %self.config.id, model = %params.model, "Starting streaming request");

        let event_source = EventSource::new(self.request(&self.body(&params, true))).map_err(|e| {
            GatewayError::provider(&self.config.id, format!("Failed to create event source: {e}"), None)
        })?;

        let provider_id = self.config.id.clone();

        let stream = try_stream! {
            let mut es = event_source;

            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {
                        trace!(provider = %provider_id, "Stream opened");
                    }
                    Ok(Event::Message(msg)) => {
                        if msg.data.trim() == STREAM_DONE {
                            break;
                        }
                        if let Some(usage) = chunk_usage(&msg.data) {
                            on_usage(usage);
                        }
                        yield Bytes::from(msg.data);
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        error!(provider = %provider_id, error = %e, "Provider stream error");
                        Err(stream_error(&provider_id, e))?;
                    }
                }
            }

            es.close();
        };

        Ok(Box::pin(stream))
    }
}

fn stream_error(provider_id: &str, err: reqwest_eventsource::Error) -> GatewayError {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, _) => GatewayError::provider(
            provider_id,
            format!("Upstream returned {status}"),
            Some(status.as_u16()),
        ),
        other => GatewayError::streaming(format!("{provider_id}: {other}")),
    }
}

/// Usage figures carried by a stream chunk, if any
fn chunk_usage(data: &str) -> Option<Usage> {
    let chunk: Value = serde_json::from_str(data).ok()?;
    chunk
        .get("usage")
        .filter(|u| u.is_object())
        .and_then(|u| serde_json::from_value(u.clone()).ok())
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}
