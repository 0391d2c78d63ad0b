//! Operator interrupt (Ctrl-C), latched so it is never missed.

use tokio::sync::watch;

/// Set once Ctrl-C has been received. Stays set.
///
/// A background task owns the signal handler from [`Interrupt::install`]
/// on, so a Ctrl-C that arrives while nothing is waiting (for example
/// while a report is written) is still seen by the next [`Interrupt::wait`].
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

impl Interrupt {
    pub fn install() -> Self {
        let (tx, interrupt) = Self::channel();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    let _ = tx.send(true);
                }
                Err(e) => tracing::warn!(error = %e, "cannot listen for Ctrl-C"),
            }
        });
        interrupt
    }

    fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the interrupt is set. Never resolves if the signal
    /// handler could not be installed.
    pub async fn wait(&mut self) {
        if self.rx.wait_for(|set| *set).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn interrupt_before_wait_is_latched() {
        let (tx, mut interrupt) = Interrupt::channel();
        assert!(!interrupt.is_set());
        tx.send(true).expect("receiver should be alive");
        drop(tx);

        assert!(interrupt.is_set());
        tokio::time::timeout(Duration::from_millis(100), interrupt.wait())
            .await
            .expect("a latched interrupt should resolve immediately");
        // Still set for every later wait.
        tokio::time::timeout(Duration::from_millis(100), interrupt.wait())
            .await
            .expect("the interrupt should stay set");
    }

    #[tokio::test]
    async fn lost_handler_never_fires() {
        let (tx, mut interrupt) = Interrupt::channel();
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_millis(50), interrupt.wait()).await;
        assert!(waited.is_err(), "wait should stay pending");
        assert!(!interrupt.is_set());
    }

    #[tokio::test]
    async fn interrupt_wins_over_slow_work() {
        let (tx, mut interrupt) = Interrupt::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = tx.send(true);
        });
        let finished = tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(30)) => true,
            _ = interrupt.wait() => false,
        };
        assert!(!finished);
    }
}
