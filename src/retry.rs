//! Bounded retry with exponential backoff and random jitter.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How many times to try an operation and how long to wait in between
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Policy that retries immediately, for tests and offline runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let backoff = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter.is_zero() {
            return backoff;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        backoff + Duration::from_millis(jitter_ms)
    }

    /// Run `op` until it succeeds, returns a non-retryable error, or the
    /// attempt budget is spent. The last error is returned on exhaustion.
    pub async fn run<T, E, F, Fut, P>(&self, label: &str, is_retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && is_retryable(&err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{label}: attempt {attempt}/{} failed: {err}; retrying in {delay:?}",
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(10))
            .with_jitter(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1))
            .with_jitter(Duration::from_millis(50));
        for _ in 0..20 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Cell::new(0);
        let result: Result<u32, String> = RetryPolicy::immediate(3)
            .run("test", |_| true, |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt < 3 {
                        Err(format!("fail {attempt}"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn stops_at_attempt_bound() {
        let calls = Cell::new(0);
        let result: Result<(), String> = RetryPolicy::immediate(2)
            .run("test", |_| true, |_| {
                calls.set(calls.get() + 1);
                async { Err("always".to_string()) }
            })
            .await;
        assert_eq!(result, Err("always".to_string()));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_is_returned_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), String> = RetryPolicy::immediate(5)
            .run("test", |e: &String| e != "fatal", |_| {
                calls.set(calls.get() + 1);
                async { Err("fatal".to_string()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
