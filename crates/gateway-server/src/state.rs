//! Shared application state.

use gateway_config::{AuthSettings, ServerSettings};
use gateway_core::{GatewayError, GatewayStore};
use gateway_providers::ProviderTable;
use gateway_telemetry::{ErrorReporter, Metrics, TracingErrorReporter};
use std::sync::Arc;

use crate::dispatch::CompletionDispatcher;
use crate::guard::AccessGuard;
use crate::resolver::ProviderResolver;
use crate::usage::UsageRecorder;

/// State shared by every request
#[derive(Clone)]
pub struct AppState {
    /// Credentials, models, limits and usage
    pub store: Arc<dyn GatewayStore>,
    /// Provider id to completion functions
    pub providers: Arc<ProviderTable>,
    /// Prometheus metrics
    pub metrics: Metrics,
    /// Sink for failures that cannot reach the caller
    pub reporter: Arc<dyn ErrorReporter>,
    /// Credential and hint header names
    pub auth: Arc<AuthSettings>,
    /// Maximum accepted request body
    pub body_limit_bytes: usize,
    /// Relay channel capacity per stream
    pub stream_buffer: usize,
}

impl AppState {
    /// Create a new builder
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }

    /// Access guard over this state's store
    pub fn access_guard(&self) -> AccessGuard {
        AccessGuard::new(self.store.clone())
    }

    /// Provider resolver over this state's store and provider table
    pub fn resolver(&self) -> ProviderResolver {
        ProviderResolver::new(self.store.clone(), self.providers.clone())
    }

    /// Usage recorder
    pub fn usage_recorder(&self) -> UsageRecorder {
        UsageRecorder::new(self.store.clone(), self.metrics.clone(), self.reporter.clone())
    }

    /// Completion dispatcher
    pub fn dispatcher(&self) -> CompletionDispatcher {
        CompletionDispatcher::new(
            self.usage_recorder(),
            self.metrics.clone(),
            self.reporter.clone(),
            self.stream_buffer,
        )
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("providers", &self.providers)
            .field("auth", &self.auth)
            .field("body_limit_bytes", &self.body_limit_bytes)
            .field("stream_buffer", &self.stream_buffer)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AppState`]
#[derive(Default)]
pub struct AppStateBuilder {
    store: Option<Arc<dyn GatewayStore>>,
    providers: Option<ProviderTable>,
    metrics: Option<Metrics>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    auth: Option<AuthSettings>,
    server: Option<ServerSettings>,
}

impl AppStateBuilder {
    /// Set the store (required)
    #[must_use]
    pub fn store(mut self, store: Arc<dyn GatewayStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the provider table
    #[must_use]
    pub fn providers(mut self, providers: ProviderTable) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Set the metrics
    #[must_use]
    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the error reporter
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Set the header conventions
    #[must_use]
    pub fn auth(mut self, auth: AuthSettings) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the server settings
    #[must_use]
    pub fn server(mut self, server: ServerSettings) -> Self {
        self.server = Some(server);
        self
    }

    /// Build the state
    pub fn build(self) -> Result<AppState, GatewayError> {
        let store = self
            .store
            .ok_or_else(|| GatewayError::configuration("application state requires a store"))?;

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Metrics::new().map_err(|e| GatewayError::internal(e.to_string()))?,
        };
        let server = self.server.unwrap_or_default();

        Ok(AppState {
            store,
            providers: Arc::new(self.providers.unwrap_or_default()),
            metrics,
            reporter: self
                .reporter
                .unwrap_or_else(|| Arc::new(TracingErrorReporter)),
            auth: Arc::new(self.auth.unwrap_or_default()),
            body_limit_bytes: server.body_limit_bytes,
            stream_buffer: server.stream_buffer,
        })
    }
}
