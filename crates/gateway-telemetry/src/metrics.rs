//! Prometheus metrics.

use gateway_core::{CompletionMode, Usage};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// How a relayed stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Provider signalled completion
    Completed,
    /// Provider failed or never opened
    ProviderFailed,
    /// Client went away mid-stream
    ClientDisconnected,
}

impl StreamOutcome {
    /// Label value
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ProviderFailed => "provider_failed",
            Self::ClientDisconnected => "client_disconnected",
        }
    }
}

/// Metrics registration error
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Prometheus rejected a collector
    #[error("Metrics registration failed: {0}")]
    Registration(#[from] prometheus::Error),
}

/// Gateway metrics
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    completions: IntCounterVec,
    rejections: IntCounterVec,
    tokens: IntCounterVec,
    usage_failures: IntCounter,
    stream_terminations: IntCounterVec,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create and register all collectors on a fresh registry
    ///
    /// # Errors
    /// Returns error if a collector cannot be registered
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new_custom(Some("gateway".to_string()), None)?;

        let completions = IntCounterVec::new(
            Opts::new("completions_total", "Completions dispatched to providers"),
            &["provider", "mode", "outcome"],
        )?;
        let rejections = IntCounterVec::new(
            Opts::new("rejections_total", "Requests rejected before dispatch"),
            &["reason"],
        )?;
        let tokens = IntCounterVec::new(
            Opts::new("usage_tokens_total", "Tokens recorded for billing"),
            &["provider", "kind"],
        )?;
        let usage_failures = IntCounter::with_opts(Opts::new(
            "usage_record_failures_total",
            "Usage records that could not be persisted",
        ))?;
        let stream_terminations = IntCounterVec::new(
            Opts::new("stream_terminations_total", "Relayed streams by terminal outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(completions.clone()))?;
        registry.register(Box::new(rejections.clone()))?;
        registry.register(Box::new(tokens.clone()))?;
        registry.register(Box::new(usage_failures.clone()))?;
        registry.register(Box::new(stream_terminations.clone()))?;

        Ok(Self {
            registry,
            completions,
            rejections,
            tokens,
            usage_failures,
            stream_terminations,
        })
    }

    /// Count a dispatched completion
    pub fn record_completion(&self, provider: &str, mode: CompletionMode, success: bool) {
        let outcome = if success { "success" } else { "error" };
        self.completions
            .with_label_values(&[provider, &mode.to_string(), outcome])
            .inc();
    }

    /// Count a request rejected before dispatch
    pub fn record_rejection(&self, reason: &str) {
        self.rejections.with_label_values(&[reason]).inc();
    }

    /// Count recorded tokens
    pub fn record_usage(&self, provider: &str, usage: &Usage) {
        self.tokens
            .with_label_values(&[provider, "prompt"])
            .inc_by(usage.prompt_tokens);
        self.tokens
            .with_label_values(&[provider, "completion"])
            .inc_by(usage.completion_tokens);
    }

    /// Count a usage record that failed to persist
    pub fn record_usage_failure(&self) {
        self.usage_failures.inc();
    }

    /// Count a terminated stream
    pub fn record_stream_termination(&self, outcome: StreamOutcome) {
        self.stream_terminations
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Render all metrics in the Prometheus text format
    #[must_use]
    pub fn gather(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
