//! Resilience primitives guarding outbound control calls.

pub mod rate_limiter;
pub mod retry;
pub mod watchdog;

pub use rate_limiter::RateLimiter;
pub use retry::{RetryManager, RetryPolicy};
pub use watchdog::{Heartbeat, Watchdog};
