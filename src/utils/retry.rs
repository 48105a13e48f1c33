//! Generic retry-with-backoff combinator for flaky network calls.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy: attempt count, base delay, and backoff multiplier.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
            multiplier: 2,
        }
    }
}

/// Run `op` up to `policy.attempts` times, doubling (or whatever the
/// multiplier says) the delay between attempts. Returns the first success
/// or the last error.
pub async fn with_backoff<T, E, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = policy.base_delay;
    let mut last_err = None;

    for attempt in 1..=policy.attempts.max(1) {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt < policy.attempts {
                    warn!(%label, attempt, max = policy.attempts, error = %e, "Call failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= policy.multiplier;
                }
                last_err = Some(e);
            }
        }
    }

    // attempts >= 1, so last_err is always set when we get here
    Err(last_err.expect("retry loop ran at least once"))
}
