//! # Gateway Telemetry
//!
//! Observability for the completions gateway.
//!
//! This crate provides:
//! - Structured logging setup
//! - Prometheus metrics for completions, usage and streams
//! - The error reporter used for failures that cannot reach the caller

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod metrics;
pub mod reporter;

// Re-export main types
pub use logging::{init_logging, LoggingConfig, LoggingError};
pub use metrics::{Metrics, MetricsError, StreamOutcome};
pub use reporter::{ErrorReporter, RecordingErrorReporter, ReportedError, TracingErrorReporter};
