//! Error types for the gateway.
//!
//! Every failure that can end a request before the response is committed is
//! a [`GatewayError`] variant with a fixed HTTP status. Failures after a
//! stream is committed are only ever logged.

use http::StatusCode;

use crate::provider::CompletionMode;
use crate::types::LimitCheckResult;
use crate::validation::ValidationError;

/// Gateway error taxonomy
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing or invalid credential
    #[error("{message}")]
    Authentication {
        /// Reason shown to the caller
        message: String,
    },

    /// Malformed request body
    #[error("Bad request")]
    Validation(#[from] ValidationError),

    /// The limit collaborator failed
    #[error("Something went wrong while calculating the current limits.")]
    LimitCalculation {
        /// Underlying failure
        details: String,
    },

    /// The account reached its ceiling
    #[error("You have reached the price limit")]
    LimitExceeded {
        /// Diagnostic detail from the limit collaborator
        result: LimitCheckResult,
    },

    /// No authorized model matched the request
    #[error(
        "No model with name {model} found.{}",
        provider_hint.as_ref().map(|p| format!(" Requested Provider: {p}")).unwrap_or_default()
    )]
    ModelNotFound {
        /// Requested model name
        model: String,
        /// Explicit provider hint, if one was sent
        provider_hint: Option<String>,
    },

    /// The model exists but its provider has no function for the mode
    #[error("Could not find a callback function for the provider {provider}.")]
    ProviderFunctionMissing {
        /// Provider identifier
        provider: String,
        /// Requested mode
        mode: CompletionMode,
    },

    /// Upstream provider call failed
    #[error("Provider {provider} request failed: {message}")]
    Provider {
        /// Provider identifier
        provider: String,
        /// Failure description
        message: String,
        /// Upstream HTTP status, if any
        status: Option<u16>,
    },

    /// Provider stream failed mid-flight
    #[error("Stream error: {message}")]
    Stream {
        /// Failure description
        message: String,
    },

    /// Storage collaborator failed
    #[error("Storage error: {message}")]
    Store {
        /// Failure description
        message: String,
    },

    /// Configuration problem
    #[error("Configuration error: {message}")]
    Configuration {
        /// Failure description
        message: String,
    },

    /// Anything else
    #[error("Internal error: {message}")]
    Internal {
        /// Failure description
        message: String,
    },
}

impl GatewayError {
    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status,
        }
    }

    /// Create a streaming error
    pub fn streaming(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status for this error.
    ///
    /// Schema failures answer 404 for compatibility with existing clients.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::NOT_FOUND,
            Self::LimitCalculation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::LimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            Self::ProviderFunctionMissing { .. } => StatusCode::BAD_REQUEST,
            Self::Provider { .. } | Self::Stream { .. } => StatusCode::BAD_GATEWAY,
            Self::Store { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "authentication_error",
            Self::Validation(_) => "validation_error",
            Self::LimitCalculation { .. } => "limit_calculation_error",
            Self::LimitExceeded { .. } => "limit_exceeded",
            Self::ModelNotFound { .. } => "model_not_found",
            Self::ProviderFunctionMissing { .. } => "provider_function_missing",
            Self::Provider { .. } => "provider_error",
            Self::Stream { .. } => "stream_error",
            Self::Store { .. } => "store_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}
