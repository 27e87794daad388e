//! Bounded-attempt execution with jittered backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never below one.
    pub attempts: u32,
    /// Wait after failed attempt `n` is `backoff[n - 1]`, clamped to the last entry.
    pub backoff: Vec<Duration>,
    /// Upper bound of the uniform random delay added to every wait.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: vec![Duration::from_millis(500), Duration::from_secs(1)],
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Base delay after the given failed attempt (1-based), without jitter.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let index = usize::try_from(attempt.saturating_sub(1)).unwrap_or(usize::MAX);
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or_default()
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.backoff_for(attempt);
        if self.jitter.is_zero() {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=self.jitter.as_secs_f64());
        base + Duration::from_secs_f64(jitter)
    }
}

/// Runs an async operation under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryManager {
    policy: RetryPolicy,
}

impl RetryManager {
    #[must_use]
    pub fn new(mut policy: RetryPolicy) -> Self {
        policy.attempts = policy.attempts.max(1);
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call `attempt` until it succeeds or the budget is exhausted.
    ///
    /// The final failure is returned unmodified.
    pub async fn run<F, Fut, T, E>(&self, mut attempt: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut current = 1;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if current < self.policy.attempts => {
                    let delay = self.policy.delay_for(current);
                    tracing::debug!(
                        attempt = current,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    current += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
