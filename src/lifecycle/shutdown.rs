//! Shutdown coordination.

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::resilience::with_deadline;

/// Broadcast channel every long-running task subscribes to.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Trigger shutdown and wait up to `deadline` for `tasks` to finish.
    ///
    /// Returns the number of tasks that did not finish in time.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, deadline: Duration) -> usize {
        self.trigger();
        let total = tasks.len();
        let joined = with_deadline(deadline, async {
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::warn!(error = %e, "Background task ended abnormally");
                }
            }
        })
        .await;

        match joined {
            Ok(()) => 0,
            Err(_) => {
                let lingering = self.receiver_count();
                tracing::warn!(total, lingering, "Background tasks did not stop before the deadline");
                lingering
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_stops_subscribers() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        let task = tokio::spawn(async move {
            let _ = rx.recv().await;
        });

        let lingering = shutdown.drain(vec![task], Duration::from_secs(1)).await;
        assert_eq!(lingering, 0);
        assert_eq!(shutdown.receiver_count(), 0);
    }
}
