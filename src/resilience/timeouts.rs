//! Timeout enforcement.
//!
//! Every outbound call is wrapped in a deadline; a timed-out call is treated
//! as a transport failure by the caller.

use std::future::IntoFuture;
use std::time::Duration;
use thiserror::Error;

/// The wrapped future did not complete in time.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("deadline of {}s exceeded", .0.as_secs())]
pub struct DeadlineExceeded(pub Duration);

/// Await `fut` for at most `deadline`.
pub async fn with_deadline<F: IntoFuture>(
    deadline: Duration,
    fut: F,
) -> Result<F::Output, DeadlineExceeded> {
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| DeadlineExceeded(deadline))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let result = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;
        assert_eq!(result, Err(DeadlineExceeded(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn test_completes_in_time() {
        let result = with_deadline(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(result, Ok(7));
    }
}
