//! Storage seam.
//!
//! Credentials, authorized models, limits and usage all live behind this
//! trait. Implementations are expected to be cheap to share across requests.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::types::{ApiKey, LimitCheckResult, ModelConfig, UsageRecord};

/// Storage collaborator used by the gateway
#[async_trait]
pub trait GatewayStore: Send + Sync {
    /// Look up the credential for a presented secret.
    ///
    /// Returns `Ok(None)` for unknown or revoked keys.
    async fn find_api_key(&self, secret: &str) -> Result<Option<ApiKey>, GatewayError>;

    /// Models the credential may use, in the store's preferred order
    async fn get_authorized_models(&self, api_key_id: &str) -> Result<Vec<ModelConfig>, GatewayError>;

    /// Calculate whether the credential's account has reached its ceiling
    async fn check_limits(&self, api_key_id: &str) -> Result<LimitCheckResult, GatewayError>;

    /// Persist one usage record
    async fn record_usage(&self, record: UsageRecord) -> Result<(), GatewayError>;
}
