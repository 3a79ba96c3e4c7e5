//! API error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::GatewayError;
use serde::Serialize;
use serde_json::{json, Value};

/// Error body returned to callers: `{error, details?}`
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Human-readable message
    pub error: String,
    /// Structured detail, when the failure has any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// An error that renders as an HTTP response
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    /// Create an error with a status and message
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: message.into(),
                details: None,
            },
        }
    }

    /// Attach details
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.body.details = Some(details);
        self
    }

    /// Response status
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response body
    #[must_use]
    pub fn body(&self) -> &ErrorBody {
        &self.body
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = err.status_code();
        let details = match &err {
            GatewayError::Validation(validation) => Some(json!(validation.violations)),
            GatewayError::LimitCalculation { details } => Some(Value::String(details.clone())),
            GatewayError::Provider {
                provider, status, ..
            } => Some(json!({ "provider": provider, "status": status })),
            _ => None,
        };

        let api_error = Self::new(status, err.to_string());
        match details {
            Some(details) => api_error.with_details(details),
            None => api_error,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
