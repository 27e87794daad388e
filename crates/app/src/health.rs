//! Health score derived from call metrics and today's counters.

use std::sync::Arc;

use serde::Serialize;

use crate::metrics::{CommandMetrics, DailyCounters, MetricsRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => Self::Healthy,
            50.. => Self::Degraded,
            _ => Self::Unhealthy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub score: u8,
    pub status: HealthStatus,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HealthMonitor {
    metrics: Arc<MetricsRegistry>,
    counters: Arc<DailyCounters>,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(metrics: Arc<MetricsRegistry>, counters: Arc<DailyCounters>) -> Self {
        Self { metrics, counters }
    }

    #[must_use]
    pub fn evaluate(&self) -> HealthReport {
        let totals = self.metrics.snapshot().totals();
        let watchdog_resets = self.counters.today().watchdog_resets;
        score(&totals, watchdog_resets)
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn score(totals: &CommandMetrics, watchdog_resets: u64) -> HealthReport {
    let mut score = 100i32;
    let mut issues = Vec::new();

    // error ratio over executed calls, up to 40 points
    let errors = ratio(totals.errors, totals.ok + totals.errors);
    if errors > 0.25 {
        score -= 40;
    } else if errors > 0.10 {
        score -= 25;
    } else if errors > 0.0 {
        score -= 10;
    }
    if errors > 0.10 {
        issues.push(format!("{:.0}% of controller calls failed", errors * 100.0));
    }

    // rate-limited ratio over all calls, up to 20 points
    let limited = ratio(totals.rate_limited, totals.calls);
    if limited > 0.20 {
        score -= 20;
    } else if limited > 0.05 {
        score -= 10;
    }
    if limited > 0.05 {
        issues.push(format!("{:.0}% of controller calls were rate limited", limited * 100.0));
    }

    // average latency, up to 20 points
    let latency = totals.average_duration_ms();
    if latency > 2000.0 {
        score -= 20;
        issues.push(format!("average controller latency is {latency:.0} ms"));
    } else if latency > 500.0 {
        score -= 10;
        issues.push(format!("average controller latency is {latency:.0} ms"));
    }

    // watchdog resets today, up to 20 points
    if watchdog_resets > 5 {
        score -= 20;
    } else if watchdog_resets > 0 {
        score -= 5;
    }
    if watchdog_resets > 0 {
        issues.push(format!("{watchdog_resets} watchdog resets today"));
    }

    let score = u8::try_from(score.clamp(0, 100)).unwrap_or(0);
    HealthReport {
        score,
        status: HealthStatus::from_score(score),
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::DailyCounter;
    use std::time::Duration;

    fn monitor() -> (HealthMonitor, Arc<MetricsRegistry>, Arc<DailyCounters>) {
        let metrics = Arc::new(MetricsRegistry::new());
        let counters = Arc::new(DailyCounters::new());
        let monitor = HealthMonitor::new(Arc::clone(&metrics), Arc::clone(&counters));
        (monitor, metrics, counters)
    }

    #[test]
    fn should_be_healthy_when_nothing_happened() {
        let (monitor, _, _) = monitor();
        let report = monitor.evaluate();
        assert_eq!(report.score, 100);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn should_degrade_when_many_calls_fail() {
        let (monitor, metrics, _) = monitor();
        for _ in 0..3 {
            metrics.record_success("apply", Duration::from_millis(10));
            metrics.record_failure("apply", Duration::from_millis(10));
        }
        let report = monitor.evaluate();
        assert_eq!(report.score, 60);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.issues.len(), 1);
    }

    #[test]
    fn should_be_unhealthy_when_everything_goes_wrong() {
        let (monitor, metrics, counters) = monitor();
        metrics.record_failure("apply", Duration::from_secs(3));
        metrics.record_rate_limited("apply");
        for _ in 0..6 {
            counters.increment(DailyCounter::WatchdogResets);
        }
        let report = monitor.evaluate();
        assert_eq!(report.score, 0);
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.issues.len(), 4);
    }

    #[test]
    fn should_map_score_to_status() {
        assert_eq!(HealthStatus::from_score(80), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_score(79), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_score(50), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_score(49), HealthStatus::Unhealthy);
    }
}
