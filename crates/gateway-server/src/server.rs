//! HTTP server with graceful shutdown.

use gateway_config::ServerSettings;
use gateway_core::GatewayError;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::{routes::create_router, shutdown::shutdown_signal, state::AppState};

/// Gateway HTTP server
#[derive(Debug)]
pub struct Server {
    settings: ServerSettings,
    state: AppState,
}

impl Server {
    /// Create a server
    pub fn new(settings: ServerSettings, state: AppState) -> Self {
        Self { settings, state }
    }

    /// Bind address
    pub fn addr(&self) -> Result<SocketAddr, GatewayError> {
        format!("{}:{}", self.settings.host, self.settings.port)
            .parse()
            .map_err(|e| GatewayError::configuration(format!("invalid bind address: {e}")))
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<(), GatewayError> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `signal` resolves, then drain for at most the configured
    /// shutdown timeout.
    pub async fn run_until<F>(self, signal: F) -> Result<(), GatewayError>
    where
        F: Future<Output = &'static str> + Send + 'static,
    {
        let addr = self.addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::internal(format!("failed to bind {addr}: {e}")))?;

        info!(address = %addr, "Gateway listening");

        let (signalled_tx, signalled_rx) = oneshot::channel();
        let app = create_router(self.state);

        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            let name = signal.await;
            info!(signal = name, "Shutdown signal received, draining connections");
            let _ = signalled_tx.send(());
        });
        let mut serve = tokio::spawn(async move { serve.await });

        let result = tokio::select! {
            result = &mut serve => result,
            Ok(()) = signalled_rx => {
                match tokio::time::timeout(self.settings.shutdown_timeout, &mut serve).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            timeout = ?self.settings.shutdown_timeout,
                            "Shutdown timeout elapsed, aborting open connections"
                        );
                        serve.abort();
                        return Ok(());
                    }
                }
            }
        };

        result
            .map_err(|e| GatewayError::internal(format!("server task failed: {e}")))?
            .map_err(|e| GatewayError::internal(format!("server error: {e}")))?;

        info!("Gateway stopped");
        Ok(())
    }
}
