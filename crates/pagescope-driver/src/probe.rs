//! Readiness probe for the debugging endpoint.

use std::time::Duration;

use tokio::net::TcpStream;

use crate::error::DriverError;

/// Retry policy for [`wait_until_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    pub poll_interval: Duration,
    pub max_retries: u32,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_retries: 10,
        }
    }
}

impl From<&pagescope_types::DriverConfig> for ProbePolicy {
    fn from(config: &pagescope_types::DriverConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.ready_poll_interval_ms),
            max_retries: config.ready_max_retries,
        }
    }
}

/// Whether a TCP connection to `host:port` succeeds right now.
pub async fn is_reachable(host: &str, port: u16) -> bool {
    TcpStream::connect((host, port)).await.is_ok()
}

/// Poll until the endpoint accepts TCP connections.
///
/// Fails with [`DriverError::TargetUnreachable`] once `max_retries` attempts
/// have failed.
pub async fn wait_until_ready(host: &str, port: u16, policy: ProbePolicy) -> Result<(), DriverError> {
    let attempts = policy.max_retries.max(1);
    for attempt in 1..=attempts {
        if is_reachable(host, port).await {
            tracing::debug!(host, port, attempt, "debugging endpoint is ready");
            return Ok(());
        }
        tracing::debug!(host, port, attempt, "debugging endpoint not ready yet");
        if attempt < attempts {
            tokio::time::sleep(policy.poll_interval).await;
        }
    }
    Err(DriverError::TargetUnreachable {
        endpoint: format!("{host}:{port}"),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn fast(max_retries: u32) -> ProbePolicy {
        ProbePolicy {
            poll_interval: Duration::from_millis(5),
            max_retries,
        }
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn ready_when_listening() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        wait_until_ready("127.0.0.1", port, fast(3)).await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_after_bounded_retries() {
        let port = closed_port().await;
        let err = wait_until_ready("127.0.0.1", port, fast(3)).await.unwrap_err();
        match err {
            DriverError::TargetUnreachable { endpoint, attempts } => {
                assert_eq!(attempts, 3);
                assert_eq!(endpoint, format!("127.0.0.1:{port}"));
            }
            other => panic!("expected TargetUnreachable, got {other:?}"),
        }
    }

    #[test]
    fn policy_from_config() {
        let config = pagescope_types::DriverConfig::default();
        assert_eq!(ProbePolicy::from(&config), ProbePolicy::default());
    }
}
