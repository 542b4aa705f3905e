//! Racing an operation against a timer.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Wait for `future` for at most `duration`.
///
/// If the timer wins, `on_timeout` is called and `None` is returned. The future
/// is dropped rather than forcibly stopped, so any result it would have produced
/// is discarded.
pub async fn with_timeout<F, T>(
    duration: Duration,
    future: F,
    on_timeout: impl FnOnce(),
) -> Option<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(value) => Some(value),
        Err(_) => {
            debug!(?duration, "Operation timed out");
            on_timeout();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_long_task_times_out() {
        let timed_out = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&timed_out);
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                42
            },
            move || flag.store(true, Ordering::SeqCst),
        )
        .await;
        assert!(timed_out.load(Ordering::SeqCst));
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_short_task_completes() {
        let timed_out = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&timed_out);
        let result = with_timeout(
            Duration::from_secs(60),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                99
            },
            move || flag.store(true, Ordering::SeqCst),
        )
        .await;
        assert!(!timed_out.load(Ordering::SeqCst));
        assert_eq!(result, Some(99));
    }

    #[tokio::test]
    async fn test_callback_not_called_after_completion() {
        let timed_out = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&timed_out);
        let result = with_timeout(
            Duration::from_millis(100),
            async { 7 },
            move || flag.store(true, Ordering::SeqCst),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!timed_out.load(Ordering::SeqCst));
        assert_eq!(result, Some(7));
    }
}
