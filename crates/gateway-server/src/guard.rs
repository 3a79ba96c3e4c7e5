//! Access guard: credential verification and limit gating.
//!
//! Authentication always runs before the limit check, and both run before
//! any provider interaction.

use gateway_core::{ApiKey, GatewayError, GatewayStore, LimitCheckResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Verifies credentials and enforces account ceilings
#[derive(Clone)]
pub struct AccessGuard {
    store: Arc<dyn GatewayStore>,
}

impl AccessGuard {
    /// Create a guard over a store
    pub fn new(store: Arc<dyn GatewayStore>) -> Self {
        Self { store }
    }

    /// Verify the presented credential
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<ApiKey, GatewayError> {
        let secret = credential.ok_or_else(|| GatewayError::authentication("Missing API key"))?;

        match self.store.find_api_key(secret).await? {
            Some(api_key) => {
                debug!(api_key_id = %api_key.id, project_id = %api_key.project_id, "Authenticated");
                Ok(api_key)
            }
            None => Err(GatewayError::authentication("Invalid API key")),
        }
    }

    /// Run the limit calculation for a verified credential.
    ///
    /// A failing calculation and a reached ceiling are distinct errors.
    pub async fn check_limits(&self, api_key: &ApiKey) -> Result<LimitCheckResult, GatewayError> {
        let result = self
            .store
            .check_limits(&api_key.id)
            .await
            .map_err(|e| GatewayError::LimitCalculation {
                details: e.to_string(),
            })?;

        if result.has_reached_limit {
            warn!(
                api_key_id = %api_key.id,
                used = ?result.used,
                limit = ?result.limit,
                "Limit reached"
            );
            return Err(GatewayError::LimitExceeded { result });
        }

        Ok(result)
    }
}

impl std::fmt::Debug for AccessGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGuard").finish_non_exhaustive()
    }
}
