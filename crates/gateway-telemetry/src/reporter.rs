//! Error reporting for failures that happen after a response is committed.
//!
//! Such failures cannot change what the caller sees, so they are handed to
//! an [`ErrorReporter`] instead of being returned.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::error;

/// A failure handed to the reporter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    /// Where it happened (e.g. "usage_recording")
    pub context: &'static str,
    /// Failure description
    pub message: String,
}

/// Sink for failures that must not reach the caller
pub trait ErrorReporter: Send + Sync {
    /// Report one failure
    fn report(&self, context: &'static str, error: &dyn std::error::Error);
}

/// Reporter that logs through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, context: &'static str, error: &dyn std::error::Error) {
        error!(context = context, error = %error, "Reported error");
    }
}

/// Reporter that keeps every report in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingErrorReporter {
    reports: Arc<Mutex<Vec<ReportedError>>>,
}

impl RecordingErrorReporter {
    /// Create an empty reporter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far
    #[must_use]
    pub fn reports(&self) -> Vec<ReportedError> {
        self.reports.lock().clone()
    }
}

impl ErrorReporter for RecordingErrorReporter {
    fn report(&self, context: &'static str, error: &dyn std::error::Error) {
        self.reports.lock().push(ReportedError {
            context,
            message: error.to_string(),
        });
    }
}
