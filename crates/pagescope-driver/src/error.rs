//! Error types for the pagescope-driver crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while driving the target.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Failed to establish the channel to the debugging endpoint.
    #[error("failed to connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    /// The channel was lost while commands were outstanding.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// A command returned an error response.
    #[error("'{method}' failed with protocol error {code}: {message}")]
    Protocol {
        method: String,
        code: i64,
        message: String,
    },

    /// Page-script execution failed.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// The readiness probe exhausted its retries.
    #[error("target at {endpoint} unreachable after {attempts} attempts")]
    TargetUnreachable { endpoint: String, attempts: u32 },

    /// A bounded wait elapsed.
    #[error("timed out waiting for {what} after {duration:?}")]
    Timeout { what: String, duration: Duration },

    /// Navigation was rejected by the target.
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// The browser process could not be started or stopped.
    #[error("launcher error: {reason}")]
    Launch { reason: String },
}

impl DriverError {
    /// Whether this error means the channel itself is unusable.
    ///
    /// Channel errors abort a run; everything else is local to the
    /// operation that produced it.
    pub fn is_channel_error(&self) -> bool {
        matches!(
            self,
            DriverError::Connection { .. }
                | DriverError::Transport { .. }
                | DriverError::TargetUnreachable { .. }
        )
    }

    pub(crate) fn transport(reason: impl Into<String>) -> Self {
        DriverError::Transport {
            reason: reason.into(),
        }
    }
}

/// Failure of a script evaluated in the page context.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    /// The script threw or its promise rejected.
    #[error("script threw: {message}")]
    Threw { message: String },

    /// The page navigated away mid-evaluation.
    #[error("execution context was destroyed before the script settled")]
    ContextDestroyed,

    /// The script settled with a value that could not be transferred.
    #[error("script returned an unusable value: {reason}")]
    InvalidResult { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_errors() {
        assert!(DriverError::transport("closed").is_channel_error());
        assert!(DriverError::TargetUnreachable {
            endpoint: "127.0.0.1:9222".into(),
            attempts: 10
        }
        .is_channel_error());
        assert!(!DriverError::from(EvaluationError::ContextDestroyed).is_channel_error());
        assert!(!DriverError::Protocol {
            method: "Page.navigate".into(),
            code: -32000,
            message: "x".into()
        }
        .is_channel_error());
    }

    #[test]
    fn evaluation_error_display_is_transparent() {
        let err = DriverError::from(EvaluationError::Threw {
            message: "ReferenceError: foo is not defined".into(),
        });
        assert_eq!(err.to_string(), "script threw: ReferenceError: foo is not defined");
    }
}
