//! Provider resolution.
//!
//! Picks one of the caller's authorized models for the requested name and
//! optional provider hint, then looks up the provider's function for the
//! requested mode.

use gateway_core::{
    ApiKey, BufferedCompletion, CompletionMode, GatewayError, GatewayStore, ModelConfig,
    StreamingCompletion,
};
use gateway_providers::ProviderTable;
use std::sync::Arc;
use tracing::debug;

/// The provider function selected for a request
#[derive(Clone)]
pub enum CompletionFunction {
    /// Single JSON response
    Buffered(Arc<dyn BufferedCompletion>),
    /// Byte stream relayed as server-sent events
    Streaming(Arc<dyn StreamingCompletion>),
}

impl CompletionFunction {
    /// Mode of this function
    #[must_use]
    pub fn mode(&self) -> CompletionMode {
        match self {
            Self::Buffered(_) => CompletionMode::Buffered,
            Self::Streaming(_) => CompletionMode::Streaming,
        }
    }
}

impl std::fmt::Debug for CompletionFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CompletionFunction").field(&self.mode()).finish()
    }
}

/// A resolved model and its completion function
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Selected model
    pub model: ModelConfig,
    /// Function to call
    pub function: CompletionFunction,
}

/// Select the first authorized model matching the name, and the provider
/// when a hint is given.
pub fn select_model<'a>(
    models: &'a [ModelConfig],
    name: &str,
    provider_hint: Option<&str>,
) -> Result<&'a ModelConfig, GatewayError> {
    models
        .iter()
        .find(|m| m.name == name && provider_hint.map_or(true, |p| m.provider == p))
        .ok_or_else(|| GatewayError::ModelNotFound {
            model: name.to_string(),
            provider_hint: provider_hint.map(String::from),
        })
}

/// Resolves requests against the caller's authorized models
#[derive(Clone)]
pub struct ProviderResolver {
    store: Arc<dyn GatewayStore>,
    providers: Arc<ProviderTable>,
}

impl ProviderResolver {
    /// Create a resolver
    pub fn new(store: Arc<dyn GatewayStore>, providers: Arc<ProviderTable>) -> Self {
        Self { store, providers }
    }

    /// Resolve a model name for a credential and mode
    pub async fn resolve(
        &self,
        api_key: &ApiKey,
        model: &str,
        provider_hint: Option<&str>,
        mode: CompletionMode,
    ) -> Result<Resolution, GatewayError> {
        let models = self.store.get_authorized_models(&api_key.id).await?;
        let model = select_model(&models, model, provider_hint)?.clone();

        debug!(
            model_id = %model.id,
            model = %model.name,
            provider = %model.provider,
            mode = %mode,
            "Resolved model"
        );

        let function = self.function_for(&model, mode)?;
        Ok(Resolution { model, function })
    }

    /// Look up the provider function for a model and mode
    pub fn function_for(
        &self,
        model: &ModelConfig,
        mode: CompletionMode,
    ) -> Result<CompletionFunction, GatewayError> {
        let function = match mode {
            CompletionMode::Buffered => self
                .providers
                .buffered(&model.provider)
                .map(CompletionFunction::Buffered),
            CompletionMode::Streaming => self
                .providers
                .streaming(&model.provider)
                .map(CompletionFunction::Streaming),
        };

        function.ok_or_else(|| GatewayError::ProviderFunctionMissing {
            provider: model.provider.clone(),
            mode,
        })
    }
}
