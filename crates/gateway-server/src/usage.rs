//! Usage recording.
//!
//! One call persists one record; nothing is deduplicated. Buffered responses
//! record at most once, streams once per provider callback firing.

use gateway_core::{
    ApiKey, GatewayError, GatewayStore, ModelConfig, Usage, UsageCallback, UsageRecord,
};
use gateway_telemetry::{ErrorReporter, Metrics};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};

/// Identifies who and what a usage figure set is billed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageContext {
    /// Project billed
    pub project_id: String,
    /// Credential used
    pub api_key_id: String,
    /// Model record used
    pub model_id: String,
    /// Provider that served the completion
    pub provider: String,
}

impl UsageContext {
    /// Build the context for a credential and resolved model
    #[must_use]
    pub fn new(api_key: &ApiKey, model: &ModelConfig) -> Self {
        Self {
            project_id: api_key.project_id.clone(),
            api_key_id: api_key.id.clone(),
            model_id: model.id.clone(),
            provider: model.provider.clone(),
        }
    }

    /// Normalize a usage figure set into a record
    #[must_use]
    pub fn record(&self, usage: Usage) -> UsageRecord {
        UsageRecord {
            project_id: self.project_id.clone(),
            api_key_id: self.api_key_id.clone(),
            model_id: self.model_id.clone(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// Persists usage records and reports failures
#[derive(Clone)]
pub struct UsageRecorder {
    store: Arc<dyn GatewayStore>,
    metrics: Metrics,
    reporter: Arc<dyn ErrorReporter>,
}

impl UsageRecorder {
    /// Create a recorder
    pub fn new(
        store: Arc<dyn GatewayStore>,
        metrics: Metrics,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            store,
            metrics,
            reporter,
        }
    }

    /// Persist one record
    pub async fn record(&self, context: &UsageContext, usage: Usage) -> Result<(), GatewayError> {
        self.store.record_usage(context.record(usage)).await?;
        self.metrics.record_usage(&context.provider, &usage);

        debug!(
            api_key_id = %context.api_key_id,
            model_id = %context.model_id,
            total_tokens = usage.total_tokens,
            "Usage recorded"
        );
        Ok(())
    }

    /// Persist one record on a background task.
    ///
    /// Failures go to the error reporter; the caller never sees them.
    pub fn spawn_record(&self, context: UsageContext, usage: Usage) -> JoinHandle<()> {
        let recorder = self.clone();
        tokio::spawn(
            async move {
                if let Err(e) = recorder.record(&context, usage).await {
                    recorder.metrics.record_usage_failure();
                    recorder.reporter.report("usage_recording", &e);
                }
            }
            .in_current_span(),
        )
    }

    /// A provider usage callback that records every firing.
    ///
    /// The callback only spawns, so it never blocks the stream that fires it.
    #[must_use]
    pub fn callback(&self, context: UsageContext) -> UsageCallback {
        let recorder = self.clone();
        Arc::new(move |usage| {
            recorder.spawn_record(context.clone(), usage);
        })
    }
}

impl std::fmt::Debug for UsageRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageRecorder").finish_non_exhaustive()
    }
}
