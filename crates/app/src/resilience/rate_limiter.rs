//! Sliding-window admission control.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::lock;

/// Admits at most `max_events` calls within any `window`.
#[derive(Debug)]
pub struct RateLimiter {
    max_events: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `max_events` of zero is raised to one.
    #[must_use]
    pub fn new(max_events: usize, window: Duration) -> Self {
        let max_events = max_events.max(1);
        Self {
            max_events,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(max_events)),
        }
    }

    /// Evict expired entries, then admit and record the call if capacity remains.
    pub fn allow(&self) -> bool {
        let now = Instant::now();
        let mut admitted = lock(&self.admitted);
        while admitted
            .front()
            .is_some_and(|at| now.duration_since(*at) >= self.window)
        {
            admitted.pop_front();
        }
        if admitted.len() < self.max_events {
            admitted.push_back(now);
            true
        } else {
            false
        }
    }

    /// Fraction of the window currently used, in `0.0..=1.0`. Does not evict.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn load(&self) -> f64 {
        let now = Instant::now();
        let live = lock(&self.admitted)
            .iter()
            .filter(|at| now.duration_since(**at) < self.window)
            .count();
        (live as f64 / self.max_events as f64).min(1.0)
    }

    #[must_use]
    pub fn max_events(&self) -> usize {
        self.max_events
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn should_deny_second_call_when_window_is_full() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn should_admit_again_when_window_expires() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.allow());
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!limiter.allow());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_load_without_consuming_capacity() {
        let limiter = RateLimiter::new(4, Duration::from_secs(10));
        assert!((limiter.load() - 0.0).abs() < f64::EPSILON);
        limiter.allow();
        limiter.allow();
        assert!((limiter.load() - 0.5).abs() < f64::EPSILON);
        assert!((limiter.load() - 0.5).abs() < f64::EPSILON);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!((limiter.load() - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_record_denied_calls() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        assert!(limiter.allow());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(limiter.allow());
        assert!(!limiter.allow());
        assert!(!limiter.allow());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[test]
    fn should_raise_zero_capacity_to_one() {
        assert_eq!(RateLimiter::new(0, Duration::from_secs(1)).max_events(), 1);
    }
}
