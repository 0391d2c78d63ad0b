//! Error types for the pagescope-gather crate.

use std::fmt;

use pagescope_audit::AuditError;
use pagescope_driver::DriverError;
use pagescope_types::PagescopeError;
use thiserror::Error;

/// Failure of one gatherer hook or one step of a pass.
#[derive(Debug, Error)]
pub enum GatherError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// The page returned data the gatherer could not interpret.
    #[error("unexpected page data: {reason}")]
    UnexpectedData { reason: String },

    /// A hook ran out of order, for example `after_pass` without `during_pass`.
    #[error("gatherer '{gatherer}' is missing state: {reason}")]
    MissingState { gatherer: String, reason: String },

    #[error(transparent)]
    Artifact(#[from] PagescopeError),
}

impl GatherError {
    pub fn unexpected_data(reason: impl Into<String>) -> Self {
        GatherError::UnexpectedData {
            reason: reason.into(),
        }
    }

    /// Whether the failure aborts the run instead of being recorded as a
    /// failed artifact.
    pub fn is_fatal(&self) -> bool {
        match self {
            GatherError::Driver(e) => e.is_channel_error(),
            GatherError::Artifact(_) => true,
            GatherError::UnexpectedData { .. } | GatherError::MissingState { .. } => false,
        }
    }
}

/// Problems found while checking a run configuration against the
/// available gatherers and audits.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid run configuration: {}", .problems.join("; "))]
pub struct ConfigError {
    pub problems: Vec<String>,
}

/// Where an aborted run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    Connect,
    Configure,
    Pass { index: usize, name: String },
    Audit { index: usize, name: String },
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Connect => write!(f, "connect"),
            RunPhase::Configure => write!(f, "configure"),
            RunPhase::Pass { index, name } => write!(f, "pass #{index} '{name}'"),
            RunPhase::Audit { index, name } => write!(f, "audit #{index} '{name}'"),
        }
    }
}

/// An aborted run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("connect failed: {0}")]
    Connect(#[source] DriverError),

    #[error(transparent)]
    Configure(#[from] ConfigError),

    #[error("pass #{index} '{name}' failed: {source}")]
    Pass {
        index: usize,
        name: String,
        #[source]
        source: GatherError,
    },

    #[error("audit #{index} '{name}' failed: {source}")]
    Audit {
        index: usize,
        name: String,
        #[source]
        source: AuditError,
    },
}

impl RunError {
    pub fn phase(&self) -> RunPhase {
        match self {
            RunError::Connect(_) => RunPhase::Connect,
            RunError::Configure(_) => RunPhase::Configure,
            RunError::Pass { index, name, .. } => RunPhase::Pass {
                index: *index,
                name: name.clone(),
            },
            RunError::Audit { index, name, .. } => RunPhase::Audit {
                index: *index,
                name: name.clone(),
            },
        }
    }
}

impl From<pagescope_audit::AuditFailure> for RunError {
    fn from(failure: pagescope_audit::AuditFailure) -> Self {
        RunError::Audit {
            index: failure.index,
            name: failure.name,
            source: failure.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagescope_driver::EvaluationError;

    #[test]
    fn only_channel_errors_are_fatal() {
        let transport: GatherError = DriverError::Transport {
            reason: "closed".into(),
        }
        .into();
        assert!(transport.is_fatal());

        let threw: GatherError = DriverError::Evaluation(EvaluationError::Threw {
            message: "TypeError".into(),
        })
        .into();
        assert!(!threw.is_fatal());
        assert!(!GatherError::unexpected_data("not a list").is_fatal());
    }

    #[test]
    fn config_error_lists_every_problem() {
        let err = ConfigError {
            problems: vec!["unknown gatherer 'x'".into(), "duplicate pass name 'a'".into()],
        };
        assert_eq!(
            err.to_string(),
            "invalid run configuration: unknown gatherer 'x'; duplicate pass name 'a'"
        );
    }

    #[test]
    fn run_error_reports_phase() {
        let err = RunError::Pass {
            index: 1,
            name: "scrolling".into(),
            source: GatherError::Driver(DriverError::Transport {
                reason: "socket closed".into(),
            }),
        };
        assert_eq!(
            err.phase(),
            RunPhase::Pass {
                index: 1,
                name: "scrolling".into()
            }
        );
        assert_eq!(err.phase().to_string(), "pass #1 'scrolling'");
        assert!(err.to_string().contains("socket closed"));
    }
}
