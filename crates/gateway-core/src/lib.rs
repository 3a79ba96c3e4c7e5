//! # Gateway Core
//!
//! Core types, traits, and error handling for the completions gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - The validated completion request and its schema validator
//! - Provider seams for buffered and streaming completions
//! - The storage seam for credentials, models, limits and usage
//! - Error types and their HTTP mapping

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod provider;
pub mod request;
pub mod response;
pub mod store;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use error::GatewayError;
pub use provider::{
    BufferedCompletion, ByteStream, CompletionMode, CompletionParams, StreamingCompletion,
    UsageCallback,
};
pub use request::{
    ChatMessage, CompletionRequest, ContentPart, ImageDetail, ImageUrl, MessageContent,
    MessageRole, DEFAULT_TEMPERATURE,
};
pub use response::{ProviderResponse, Usage};
pub use store::GatewayStore;
pub use types::{hash_secret, ApiKey, LimitCheckResult, ModelConfig, UsageRecord};
pub use validation::{validate_completion_request, FieldViolation, ValidationError};
