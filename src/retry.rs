//! Exponential backoff for broker writes
//!
//! The delay before retry `n` is derived from the retry number alone, so
//! jitter never feeds back into later delays.

use crate::config::RetryPolicy;
use crate::error::EventError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Backoff schedule for one operation; yields `None` once retries run out
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    policy: RetryPolicy,
    retries: u32,
}

impl ExponentialBackoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            policy: policy.clone(),
            retries: 0,
        }
    }

    /// Un-randomized delay before retry `retry` (0-indexed), capped at the max interval
    pub fn base_delay(&self, retry: u32) -> Duration {
        let max = Duration::from_millis(self.policy.max_interval_ms);
        let exp = retry.min(i32::MAX as u32) as i32;
        let millis = self.policy.initial_interval_ms as f64 * self.policy.multiplier.powi(exp);

        if !millis.is_finite() || millis < 0.0 || millis > max.as_millis() as f64 {
            max
        } else {
            Duration::from_secs_f64(millis / 1000.0)
        }
    }

    /// Delay before the next retry, or `None` when the retry cap is reached
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.retries >= self.policy.max_retries {
            return None;
        }
        let base = self.base_delay(self.retries);
        self.retries += 1;
        Some(randomize(base, self.policy.randomization_factor))
    }

    /// Retries handed out so far
    pub fn retries(&self) -> u32 {
        self.retries
    }
}

fn randomize(base: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || base.is_zero() {
        return base;
    }
    let factor = factor.min(1.0);
    let secs = base.as_secs_f64();
    let delta = secs * factor;
    let jittered = rand::thread_rng().gen_range((secs - delta)..=(secs + delta));
    Duration::from_secs_f64(jittered.max(0.0))
}

/// Final error of an operation whose retries ran out
#[derive(Debug)]
pub struct Exhausted {
    pub error: EventError,
    /// Total tries, including the first
    pub attempts: u32,
}

/// Run `op` until it succeeds or the policy's retries are exhausted
///
/// `notify` is called after each failed try that will be retried, with the
/// error and the wait before the next try.
pub async fn retry_notify<T, F, Fut, N>(
    policy: &RetryPolicy,
    mut op: F,
    mut notify: N,
) -> std::result::Result<T, Exhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
    N: FnMut(&EventError, Duration),
{
    let mut backoff = ExponentialBackoff::new(policy);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => match backoff.next_delay() {
                Some(delay) => {
                    notify(&error, delay);
                    tokio::time::sleep(delay).await;
                }
                None => return Err(Exhausted { error, attempts }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(initial_ms: u64, jitter: f64) -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_interval_ms: initial_ms,
            multiplier: 2.0,
            max_interval_ms: 1_000,
            randomization_factor: jitter,
        }
    }

    #[test]
    fn test_base_delay_grows_and_caps() {
        let backoff = ExponentialBackoff::new(&policy(100, 0.0));
        assert_eq!(backoff.base_delay(0), Duration::from_millis(100));
        assert_eq!(backoff.base_delay(1), Duration::from_millis(200));
        assert_eq!(backoff.base_delay(2), Duration::from_millis(400));
        assert_eq!(backoff.base_delay(4), Duration::from_millis(1_000));
        assert_eq!(backoff.base_delay(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn test_next_delay_stops_after_cap() {
        let mut backoff = ExponentialBackoff::new(&policy(100, 0.0));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(400)));
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.retries(), 3);
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let mut backoff = ExponentialBackoff::new(&policy(100, 0.5));
        let delay = backoff.next_delay().unwrap();
        assert!(delay >= Duration::from_millis(50), "{:?}", delay);
        assert!(delay <= Duration::from_millis(150), "{:?}", delay);
    }

    #[tokio::test]
    async fn test_retry_notify_gives_up_after_four_tries() {
        let calls = AtomicU32::new(0);
        let mut notified = 0;

        let result: std::result::Result<(), Exhausted> = retry_notify(
            &policy(1, 0.0),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(EventError::Timeout("write".into())) }
            },
            |_, _| notified += 1,
        )
        .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 4);
        assert!(matches!(exhausted.error, EventError::Timeout(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(notified, 3);
    }

    #[tokio::test]
    async fn test_retry_notify_returns_first_success() {
        let calls = AtomicU32::new(0);

        let result = retry_notify(
            &policy(1, 0.0),
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(EventError::Timeout("write".into()))
                    } else {
                        Ok(n)
                    }
                }
            },
            |_, _| {},
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retry_notify_success_never_notifies() {
        let result = tokio_test::block_on(retry_notify(
            &policy(1, 0.0),
            || async { Ok::<_, EventError>("written") },
            |_, _| panic!("no retry expected"),
        ));
        assert_eq!(tokio_test::assert_ok!(result), "written");
    }
}
