//! Fixed-count retry helper for transient extraction failures.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::MediaResult;

/// Re-invoke `op` up to `max_attempts` times, sleeping `delay` between
/// attempts, returning the first success or the last error.
///
/// Used for stream-URL extraction only; full downloads are single-attempt
/// by design.
pub async fn with_retry<T, F, Fut>(max_attempts: u32, delay: Duration, mut op: F) -> MediaResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = MediaResult<T>>,
{
    debug_assert!(max_attempts >= 1);

    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %err, "extraction attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_with_two_delays() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result = with_retry(3, Duration::from_secs(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(MediaError::InvalidOutput(format!("attempt {n}")))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Exactly two inter-attempt delays of 3s each (paused clock).
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts_and_returns_last_error() {
        let calls = AtomicU32::new(0);

        let result: MediaResult<()> = with_retry(3, Duration::from_secs(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(MediaError::InvalidOutput("boom".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let calls = AtomicU32::new(0);

        let result = with_retry(3, Duration::from_secs(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
