//! Executor — the sole gateway for outbound control calls.
//!
//! Every call is admitted by the [`RateLimiter`], then runs under one of a
//! fixed number of concurrency permits, wrapped by the [`RetryManager`].
//! A denied call returns at once with `RATE_LIMITED` and zero duration; it
//! is never retried. The permit is held for the whole retry sequence of a
//! single command. Per-attempt timeouts surface as retryable failures.

use std::sync::Arc;
use std::time::Duration;

use lumen_domain::error::ErrorCode;
use lumen_domain::id::{LightId, ZoneId};
use lumen_domain::light::LightState;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::metrics::{DailyCounter, DailyCounters, MetricsRegistry};
use crate::ports::{ApplyRequest, ControllerError, LightController};
use crate::resilience::{RateLimiter, RetryManager, RetryPolicy};

/// Selects the configured timeout and the metrics bucket of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandClass {
    Apply,
    ManualFlag,
}

impl CommandClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::ManualFlag => "manual_flag",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Apply(ApplyRequest),
    SetManualControl {
        zone: ZoneId,
        lights: Vec<LightId>,
        manual: bool,
    },
}

impl Command {
    #[must_use]
    pub fn class(&self) -> CommandClass {
        match self {
            Self::Apply(_) => CommandClass::Apply,
            Self::SetManualControl { .. } => CommandClass::ManualFlag,
        }
    }

    #[must_use]
    pub fn zone(&self) -> &ZoneId {
        match self {
            Self::Apply(request) => &request.zone,
            Self::SetManualControl { zone, .. } => zone,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Ok,
    Error,
}

/// Result of one logical command, retries included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ExecutionOutcome {
    fn ok(duration_ms: u64) -> Self {
        Self {
            status: ExecutionStatus::Ok,
            duration_ms,
            error_code: None,
            details: None,
        }
    }

    fn failed(duration_ms: u64, code: ErrorCode, details: String) -> Self {
        Self {
            status: ExecutionStatus::Error,
            duration_ms,
            error_code: Some(code),
            details: Some(details),
        }
    }

    fn rate_limited() -> Self {
        Self {
            status: ExecutionStatus::Error,
            duration_ms: 0,
            error_code: Some(ErrorCode::RateLimited),
            details: None,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == ExecutionStatus::Ok
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.error_code == Some(ErrorCode::RateLimited)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    pub max_concurrency: usize,
    pub rate_limit_max_events: usize,
    pub rate_limit_window: Duration,
    pub retry: RetryPolicy,
    pub apply_timeout: Duration,
    pub manual_flag_timeout: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            rate_limit_max_events: 60,
            rate_limit_window: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            apply_timeout: Duration::from_secs(5),
            manual_flag_timeout: Duration::from_secs(2),
        }
    }
}

impl ExecutorSettings {
    #[must_use]
    pub fn timeout_for(&self, class: CommandClass) -> Duration {
        match class {
            CommandClass::Apply => self.apply_timeout,
            CommandClass::ManualFlag => self.manual_flag_timeout,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug)]
pub struct Executor<C> {
    controller: C,
    settings: ExecutorSettings,
    limiter: RateLimiter,
    retry: RetryManager,
    permits: Semaphore,
    metrics: Arc<MetricsRegistry>,
    counters: Arc<DailyCounters>,
}

impl<C: LightController> Executor<C> {
    pub fn new(
        controller: C,
        settings: ExecutorSettings,
        metrics: Arc<MetricsRegistry>,
        counters: Arc<DailyCounters>,
    ) -> Self {
        let limiter = RateLimiter::new(settings.rate_limit_max_events, settings.rate_limit_window);
        let retry = RetryManager::new(settings.retry.clone());
        let permits = Semaphore::new(settings.max_concurrency.max(1));
        Self {
            controller,
            settings,
            limiter,
            retry,
            permits,
            metrics,
            counters,
        }
    }

    #[must_use]
    pub fn controller(&self) -> &C {
        &self.controller
    }

    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    #[must_use]
    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Execute with the timeout configured for the command's class.
    pub async fn execute(&self, command: Command) -> ExecutionOutcome {
        let timeout = self.settings.timeout_for(command.class());
        self.execute_with_timeout(command, timeout).await
    }

    /// Execute with an explicit per-attempt timeout.
    pub async fn execute_with_timeout(&self, command: Command, timeout: Duration) -> ExecutionOutcome {
        let class = command.class().as_str();
        let zone = command.zone().clone();

        if !self.limiter.allow() {
            tracing::warn!(zone = %zone, command = class, "command rate limited");
            self.metrics.record_rate_limited(class);
            return ExecutionOutcome::rate_limited();
        }

        let Ok(_permit) = self.permits.acquire().await else {
            return ExecutionOutcome::failed(
                0,
                ErrorCode::ControllerUnavailable,
                "executor is shut down".into(),
            );
        };

        let started = Instant::now();
        let this = self;
        let cmd = &command;
        let result = self.retry.run(move || this.attempt(cmd, timeout)).await;
        let elapsed = started.elapsed();
        let duration_ms = millis(elapsed);

        match result {
            Ok(()) => {
                tracing::debug!(zone = %zone, command = class, duration_ms, "command executed");
                self.metrics.record_success(class, elapsed);
                ExecutionOutcome::ok(duration_ms)
            }
            Err(err) => {
                tracing::warn!(
                    zone = %zone,
                    command = class,
                    duration_ms,
                    error_code = %err.code(),
                    error = %err,
                    "command failed after retries"
                );
                self.metrics.record_failure(class, elapsed);
                self.counters.increment(DailyCounter::Errors);
                ExecutionOutcome::failed(duration_ms, err.code(), err.to_string())
            }
        }
    }

    async fn attempt(&self, command: &Command, timeout: Duration) -> Result<(), ControllerError> {
        let call = async {
            match command {
                Command::Apply(request) => self.controller.apply(request.clone()).await,
                Command::SetManualControl {
                    zone,
                    lights,
                    manual,
                } => {
                    self.controller
                        .set_manual_control(zone.clone(), lights.clone(), *manual)
                        .await
                }
            }
        };
        tokio::time::timeout(timeout, call)
            .await
            .unwrap_or(Err(ControllerError::Timeout(timeout)))
    }

    /// Read a light's current state. Reads are neither rate limited nor retried.
    pub async fn light_state(&self, light: &LightId) -> Result<Option<LightState>, ControllerError> {
        let timeout = self.settings.apply_timeout;
        tokio::time::timeout(timeout, self.controller.light_state(light.clone()))
            .await
            .unwrap_or(Err(ControllerError::Timeout(timeout)))
    }
}
