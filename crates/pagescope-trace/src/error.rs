//! Error types for the pagescope-trace crate.

use thiserror::Error;

/// Errors produced by the metrics engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TraceError {
    /// The trace lacks a signal the metric needs.
    #[error("insufficient trace data: {reason}")]
    InsufficientTraceData { reason: String },
}

impl TraceError {
    pub(crate) fn insufficient(reason: impl Into<String>) -> Self {
        TraceError::InsufficientTraceData {
            reason: reason.into(),
        }
    }
}
