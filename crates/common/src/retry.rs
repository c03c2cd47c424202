//! Retry with exponential backoff for flaky I/O.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

/// Default retry count for RPC calls.
pub const DEFAULT_RPC_MAX_RETRIES: u16 = 4;

/// Backoff schedule: an initial delay and how it grows per attempt.
pub trait Backoff {
    fn base_delay_ms(&self) -> u64;

    fn next_delay_ms(&self, curr_delay_ms: u64) -> u64;
}

/// Exponential backoff with a fixed-point multiplier
/// (`multiplier / multiplier_base`, e.g. 15/10 for 1.5x), avoiding float
/// math in the hot path.
pub struct ExponentialBackoff {
    base_delay_ms: u64,
    multiplier: u64,
    multiplier_base: u64,
}

impl ExponentialBackoff {
    pub fn new(base_delay_ms: u64, multiplier: u64, multiplier_base: u64) -> Self {
        assert!(multiplier_base != 0);
        Self {
            base_delay_ms,
            multiplier,
            multiplier_base,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 1500,
            multiplier: 15,
            multiplier_base: 10,
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    fn next_delay_ms(&self, curr_delay_ms: u64) -> u64 {
        curr_delay_ms * self.multiplier / self.multiplier_base
    }
}

/// Runs a fallible operation with backoff retries, blocking the thread
/// between attempts.  For short, bounded retry budgets on the persistence
/// path.
pub fn retry_with_backoff_blocking<R, E, F>(
    name: &str,
    max_retries: u16,
    backoff: &impl Backoff,
    mut operation: F,
) -> Result<R, E>
where
    F: FnMut() -> Result<R, E>,
    E: std::fmt::Debug,
{
    let mut delay = backoff.base_delay_ms();

    for attempt in 0..=max_retries {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_retries => {
                warn!(%name, %attempt, ?err, delay_ms = delay, "operation failed, retrying");
                std::thread::sleep(Duration::from_millis(delay));
                delay = backoff.next_delay_ms(delay);
            }
            Err(err) => {
                error!(%name, ?err, "operation failed, retries exhausted");
                return Err(err);
            }
        }
    }

    unreachable!("retry loop always returns");
}

/// Runs a fallible async operation with backoff retries.
///
/// Retries `operation` up to `max_retries` times, sleeping between
/// attempts per the backoff schedule.  Logs a warning per failure and an
/// error when the attempts run out.
pub async fn retry_with_backoff<R, E, F, Fut>(
    name: &str,
    max_retries: u16,
    backoff: &impl Backoff,
    mut operation: F,
) -> Result<R, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: std::fmt::Debug,
{
    let mut delay = backoff.base_delay_ms();

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_retries => {
                warn!(%name, %attempt, ?err, delay_ms = delay, "operation failed, retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = backoff.next_delay_ms(delay);
            }
            Err(err) => {
                error!(%name, ?err, "operation failed, retries exhausted");
                return Err(err);
            }
        }
    }

    unreachable!("retry loop always returns");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let backoff = ExponentialBackoff::new(1000, 150, 100);
        assert_eq!(backoff.base_delay_ms(), 1000);
        assert_eq!(backoff.next_delay_ms(1000), 1500);
        assert_eq!(backoff.next_delay_ms(1500), 2250);
    }

    #[test]
    fn test_blocking_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_with_backoff_blocking(
            "test_op",
            3,
            &ExponentialBackoff::new(1, 10, 10),
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 1 {
                    Err("nope")
                } else {
                    Ok(n)
                }
            },
        );
        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> =
            retry_with_backoff("test_op", 5, &ExponentialBackoff::new(10, 15, 10), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("nope")
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> =
            retry_with_backoff("test_op", 2, &ExponentialBackoff::new(10, 15, 10), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope") }
            })
            .await;

        assert_eq!(result, Err("nope"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
