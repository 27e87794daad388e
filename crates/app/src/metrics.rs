//! Aggregated call metrics and per-day counters.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use lumen_domain::event::EventKind;
use serde::Serialize;

use crate::lock;

/// Counters for one command class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommandMetrics {
    pub calls: u64,
    pub ok: u64,
    pub errors: u64,
    pub rate_limited: u64,
    pub total_duration_ms: u64,
    pub max_duration_ms: u64,
}

impl CommandMetrics {
    /// Mean duration over executed calls; rate-limited calls never executed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_duration_ms(&self) -> f64 {
        let executed = self.ok + self.errors;
        if executed == 0 {
            return 0.0;
        }
        self.total_duration_ms as f64 / executed as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub commands: BTreeMap<&'static str, CommandMetrics>,
    pub events: BTreeMap<&'static str, u64>,
}

impl MetricsSnapshot {
    /// Sum over every command class.
    #[must_use]
    pub fn totals(&self) -> CommandMetrics {
        self.commands
            .values()
            .fold(CommandMetrics::default(), |mut acc, m| {
                acc.calls += m.calls;
                acc.ok += m.ok;
                acc.errors += m.errors;
                acc.rate_limited += m.rate_limited;
                acc.total_duration_ms += m.total_duration_ms;
                acc.max_duration_ms = acc.max_duration_ms.max(m.max_duration_ms);
                acc
            })
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    inner: Mutex<MetricsSnapshot>,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl MetricsRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, class: &'static str, duration: Duration) {
        self.record(class, Some(duration), true);
    }

    pub fn record_failure(&self, class: &'static str, duration: Duration) {
        self.record(class, Some(duration), false);
    }

    pub fn record_rate_limited(&self, class: &'static str) {
        self.record(class, None, false);
    }

    fn record(&self, class: &'static str, duration: Option<Duration>, ok: bool) {
        let mut inner = lock(&self.inner);
        let metrics = inner.commands.entry(class).or_default();
        metrics.calls += 1;
        match duration {
            None => metrics.rate_limited += 1,
            Some(duration) => {
                let ms = millis(duration);
                if ok {
                    metrics.ok += 1;
                } else {
                    metrics.errors += 1;
                }
                metrics.total_duration_ms = metrics.total_duration_ms.saturating_add(ms);
                metrics.max_duration_ms = metrics.max_duration_ms.max(ms);
            }
        }
    }

    pub fn record_event(&self, kind: EventKind) {
        *lock(&self.inner).events.entry(kind.as_str()).or_default() += 1;
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        lock(&self.inner).clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyCounter {
    Syncs,
    ManualOverrides,
    Adjustments,
    Errors,
    WatchdogResets,
}

/// Counts for one local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyCounts {
    pub date: NaiveDate,
    pub syncs: u64,
    pub manual_overrides: u64,
    pub adjustments: u64,
    pub errors: u64,
    pub watchdog_resets: u64,
}

impl DailyCounts {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            syncs: 0,
            manual_overrides: 0,
            adjustments: 0,
            errors: 0,
            watchdog_resets: 0,
        }
    }

    fn slot(&mut self, counter: DailyCounter) -> &mut u64 {
        match counter {
            DailyCounter::Syncs => &mut self.syncs,
            DailyCounter::ManualOverrides => &mut self.manual_overrides,
            DailyCounter::Adjustments => &mut self.adjustments,
            DailyCounter::Errors => &mut self.errors,
            DailyCounter::WatchdogResets => &mut self.watchdog_resets,
        }
    }
}

/// Counters that start over whenever the local date changes.
#[derive(Debug)]
pub struct DailyCounters {
    counts: Mutex<DailyCounts>,
}

impl Default for DailyCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl DailyCounters {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(DailyCounts::empty(today())),
        }
    }

    pub fn increment(&self, counter: DailyCounter) {
        self.increment_on(counter, today());
    }

    /// Increment as of `date`, resetting first if `date` is a new day.
    pub fn increment_on(&self, counter: DailyCounter, date: NaiveDate) {
        let mut counts = lock(&self.counts);
        roll_over(&mut counts, date);
        *counts.slot(counter) += 1;
    }

    #[must_use]
    pub fn today(&self) -> DailyCounts {
        self.on(today())
    }

    /// Counts as of `date`; a date past the stored one reads as empty.
    #[must_use]
    pub fn on(&self, date: NaiveDate) -> DailyCounts {
        let mut counts = lock(&self.counts);
        roll_over(&mut counts, date);
        *counts
    }
}

fn roll_over(counts: &mut DailyCounts, date: NaiveDate) {
    if date > counts.date {
        tracing::debug!(previous = %counts.date, %date, "daily counters rolled over");
        *counts = DailyCounts::empty(date);
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_aggregate_per_class() {
        let metrics = MetricsRegistry::new();
        metrics.record_success("apply", Duration::from_millis(20));
        metrics.record_failure("apply", Duration::from_millis(60));
        metrics.record_rate_limited("apply");
        metrics.record_success("manual_flag", Duration::from_millis(5));

        let snapshot = metrics.snapshot();
        let apply = snapshot.commands["apply"];
        assert_eq!(apply.calls, 3);
        assert_eq!(apply.ok, 1);
        assert_eq!(apply.errors, 1);
        assert_eq!(apply.rate_limited, 1);
        assert_eq!(apply.total_duration_ms, 80);
        assert_eq!(apply.max_duration_ms, 60);
        assert!((apply.average_duration_ms() - 40.0).abs() < f64::EPSILON);

        let totals = snapshot.totals();
        assert_eq!(totals.calls, 4);
        assert_eq!(totals.ok, 2);
    }

    #[test]
    fn should_count_events_by_kind() {
        let metrics = MetricsRegistry::new();
        metrics.record_event(EventKind::TimerExpired);
        metrics.record_event(EventKind::TimerExpired);
        metrics.record_event(EventKind::ManualDetected);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events["timer_expired"], 2);
        assert_eq!(snapshot.events["manual_detected"], 1);
    }

    #[test]
    fn should_accumulate_within_a_day() {
        let counters = DailyCounters::new();
        let day = NaiveDate::from_ymd_opt(2030, 3, 1).unwrap();
        counters.increment_on(DailyCounter::Syncs, day);
        counters.increment_on(DailyCounter::Syncs, day);
        counters.increment_on(DailyCounter::WatchdogResets, day);

        let counts = counters.on(day);
        assert_eq!(counts.syncs, 2);
        assert_eq!(counts.watchdog_resets, 1);
        assert_eq!(counts.errors, 0);
    }

    #[test]
    fn should_reset_when_date_changes() {
        let counters = DailyCounters::new();
        let day = NaiveDate::from_ymd_opt(2030, 3, 1).unwrap();
        counters.increment_on(DailyCounter::Adjustments, day);

        let next = day.succ_opt().unwrap();
        assert_eq!(counters.on(next).adjustments, 0);
        counters.increment_on(DailyCounter::ManualOverrides, next);

        let counts = counters.on(next);
        assert_eq!(counts.date, next);
        assert_eq!(counts.manual_overrides, 1);
        assert_eq!(counts.adjustments, 0);
    }
}
