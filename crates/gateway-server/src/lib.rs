//! # Gateway Server
//!
//! HTTP server for the completions gateway.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - The OpenAI-compatible `/v1/chat/completions` pipeline: access guard,
//!   schema validation, provider resolution and dispatch
//! - Buffered and server-sent-event response modes with usage recording
//! - Graceful shutdown handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatch;
pub mod error;
pub mod extractors;
pub mod guard;
pub mod handlers;
pub mod resolver;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod usage;

// Re-export main types
pub use dispatch::{CompletionDispatcher, StreamLifecycle};
pub use error::ApiError;
pub use guard::AccessGuard;
pub use resolver::{select_model, CompletionFunction, ProviderResolver, Resolution};
pub use routes::create_router;
pub use server::Server;
pub use shutdown::shutdown_signal;
pub use state::{AppState, AppStateBuilder};
pub use usage::{UsageContext, UsageRecorder};
