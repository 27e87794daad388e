//! # lumen-app
//!
//! Application layer — the control core and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `LightController` — outbound control calls and light state reads
//!   - `SnapshotStore` — opaque load/save of the runtime snapshot
//! - Provide **in-process infrastructure** that doesn't need IO:
//!   - `EventBus` — fire-and-forget publish/subscribe
//!   - `TimerManager` — manual-override durations and expirations
//!   - `ZoneRegistry` — zone configuration and manual/enabled state
//!   - resilience primitives: `RateLimiter`, `RetryManager`, `Watchdog`
//!   - `Executor` — the sole gateway for outbound control calls
//!   - `MetricsRegistry`, `DailyCounters`, `HealthMonitor`
//! - The **runtime orchestrator**, the state machine every other part feeds
//!
//! ## Dependency rule
//! Depends on `lumen-domain` only (plus `tokio` for tasks, timers and
//! channels). Never imports adapter crates. Adapters depend on *this* crate,
//! not the reverse.

pub mod event_bus;
pub mod executor;
pub mod health;
pub mod metrics;
pub mod orchestrator;
pub mod ports;
pub mod resilience;
pub mod timer_manager;
pub mod zone_registry;

#[cfg(test)]
pub(crate) mod testing;

/// Lock a std mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
