//! Error types for the pagescope-audit crate.

use pagescope_trace::TraceError;
use thiserror::Error;

/// Why an audit could not produce a scored result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuditError {
    /// The inputs exist but do not support a measurement. Recorded as a
    /// not-scored result.
    #[error("{reason}")]
    NotMeasurable { reason: String },

    /// The audit read an artifact or trace it did not declare. Aborts the run.
    #[error("audit '{audit}' read undeclared input '{key}'")]
    Contract { audit: String, key: String },
}

impl AuditError {
    pub fn not_measurable(reason: impl Into<String>) -> Self {
        AuditError::NotMeasurable {
            reason: reason.into(),
        }
    }
}

impl From<TraceError> for AuditError {
    fn from(err: TraceError) -> Self {
        AuditError::not_measurable(err.to_string())
    }
}

/// A contract violation raised while running a batch of audits.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("audit #{index} '{name}' failed: {source}")]
pub struct AuditFailure {
    pub index: usize,
    pub name: String,
    #[source]
    pub source: AuditError,
}
