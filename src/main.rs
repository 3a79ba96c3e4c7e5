//! # LLM Completions Gateway
//!
//! Metered, OpenAI-compatible chat completions gateway.
//!
//! ## Features
//!
//! - API-key authentication and per-project token ceilings
//! - Model resolution with an optional `x-llm-provider` hint
//! - Buffered and server-sent-event completions
//! - Usage recording for billing and limit enforcement
//! - Prometheus metrics and structured logging
//!
//! ## Usage
//!
//! ```bash
//! # Start with gateway.yaml / gateway.toml from the working directory
//! llm-completions-gateway
//!
//! # Start with a custom config file
//! GATEWAY_CONFIG=/etc/gateway/config.yaml llm-completions-gateway
//!
//! # Start with environment overrides
//! GATEWAY_PORT=9000 GATEWAY_LOG_FORMAT=json llm-completions-gateway
//! ```

use anyhow::Context;
use gateway_config::{load_config, GatewayConfig, LogFormat, StoreConfig};
use gateway_core::GatewayStore;
use gateway_providers::ProviderTable;
use gateway_server::{AppState, Server};
use gateway_store::MemoryStore;
use gateway_telemetry::{init_logging, LoggingConfig, Metrics, TracingErrorReporter};
use std::sync::Arc;
use tracing::{error, info};

/// Application entry point
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().await.context("failed to load configuration")?;

    init_logging(
        &LoggingConfig::new()
            .with_level(&config.logging.level)
            .with_json(config.logging.format == LogFormat::Json),
    )?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting LLM Completions Gateway"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "Application failed");
        return Err(e);
    }
    Ok(())
}

/// Main application logic
async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    info!(
        host = %config.server.host,
        port = config.server.port,
        providers = config.providers.len(),
        "Configuration loaded"
    );

    let metrics = Metrics::new()?;

    let providers = ProviderTable::from_config(&config.providers)?;
    let (store, referenced) = build_store(&config.store).await?;

    providers
        .validate(referenced.iter().map(String::as_str))
        .context("models reference providers that are not configured")?;

    info!(
        providers = ?providers.provider_ids(),
        "Provider table initialized"
    );

    let state = AppState::builder()
        .store(store)
        .providers(providers)
        .metrics(metrics)
        .reporter(Arc::new(TracingErrorReporter))
        .auth(config.auth.clone())
        .server(config.server.clone())
        .build()?;

    Server::new(config.server, state).run().await?;

    Ok(())
}

/// Build the configured store and list the provider ids its models use
async fn build_store(config: &StoreConfig) -> anyhow::Result<(Arc<dyn GatewayStore>, Vec<String>)> {
    match config {
        StoreConfig::Memory(seed) => {
            let store = MemoryStore::from_seed(seed)?;
            let referenced = store.referenced_providers().into_iter().collect();
            info!(
                keys = seed.api_keys.len(),
                models = seed.models.len(),
                "Using in-memory store"
            );
            Ok((Arc::new(store), referenced))
        }
        #[cfg(feature = "postgres")]
        StoreConfig::Postgres(settings) => {
            let store = gateway_store::PostgresStore::connect(settings).await?;
            let referenced = store.referenced_providers().await?;
            Ok((Arc::new(store), referenced))
        }
        #[cfg(not(feature = "postgres"))]
        StoreConfig::Postgres(_) => {
            anyhow::bail!("the postgres store requires building with the `postgres` feature")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_config::parse_config;

    #[tokio::test]
    async fn test_memory_store_reports_referenced_providers() {
        let config = parse_config(
            r"
store:
  backend: memory
  projects: [{id: p}]
  models:
    - {id: m-1, name: gpt-4o, provider: openai}
    - {id: m-2, name: mistral-large, provider: mistral}
",
            "yaml",
        )
        .expect("config");

        let (_, referenced) = build_store(&config.store).await.expect("store");
        assert_eq!(referenced, vec!["mistral".to_string(), "openai".to_string()]);

        let table = ProviderTable::new();
        assert!(table.validate(referenced.iter().map(String::as_str)).is_err());
    }
}
