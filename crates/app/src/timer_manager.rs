//! Manual-override durations and expiration timers.
//!
//! At most one live timer exists per zone: [`TimerManager::start`] always
//! cancels the previous one first. A fired timer removes its own entry and
//! publishes [`Event::TimerExpired`] on the bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lumen_domain::event::Event;
use lumen_domain::id::ZoneId;
use lumen_domain::mode::Mode;
use lumen_domain::time::{MAX_OFFSET_SECS, Timestamp, add_seconds, now};
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::event_bus::EventBus;
use crate::lock;

/// Base durations, in minutes, and the environmental boost factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    pub day_minutes: f64,
    pub night_minutes: f64,
    pub environmental_boost_factor: f64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            day_minutes: 60.0,
            night_minutes: 180.0,
            environmental_boost_factor: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ZoneProfile {
    multiplier: f64,
    environmental_enabled: bool,
}

impl Default for ZoneProfile {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            environmental_enabled: false,
        }
    }
}

#[derive(Debug)]
struct Factors {
    mode: Mode,
    environmental_active: bool,
    environmental_factor: f64,
    elevation: Option<f64>,
    profiles: HashMap<ZoneId, ZoneProfile>,
}

/// Fallback horizon when the platform clock cannot represent a deadline.
const FAR_FUTURE_SECS: u64 = 86_400;

#[derive(Debug)]
struct Timer {
    generation: u64,
    expires_at: Timestamp,
    deadline: Instant,
    handle: AbortHandle,
}

#[derive(Debug, Default)]
struct Timers {
    next_generation: u64,
    entries: HashMap<ZoneId, Timer>,
}

#[derive(Debug)]
pub struct TimerManager {
    bus: EventBus,
    settings: TimerSettings,
    factors: Mutex<Factors>,
    timers: Arc<Mutex<Timers>>,
}

impl TimerManager {
    #[must_use]
    pub fn new(bus: EventBus, settings: TimerSettings) -> Self {
        let factors = Factors {
            mode: Mode::default(),
            environmental_active: false,
            environmental_factor: settings.environmental_boost_factor,
            elevation: None,
            profiles: HashMap::new(),
        };
        Self {
            bus,
            settings,
            factors: Mutex::new(factors),
            timers: Arc::default(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &TimerSettings {
        &self.settings
    }

    /// Override duration for `zone`, in whole seconds, never below one.
    ///
    /// `base * mode * environmental * zone`, where the environmental factor
    /// only applies while the boost is active, the zone allows it and the
    /// mode is automatic.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn compute_duration(&self, zone: &ZoneId) -> u64 {
        let factors = lock(&self.factors);
        let base_minutes = if is_daytime(factors.elevation) {
            self.settings.day_minutes
        } else {
            self.settings.night_minutes
        };
        let profile = factors.profiles.get(zone).copied().unwrap_or_default();
        let environmental = if factors.environmental_active
            && profile.environmental_enabled
            && factors.mode.is_automatic()
        {
            factors.environmental_factor
        } else {
            1.0
        };

        let seconds = base_minutes
            * 60.0
            * factors.mode.duration_multiplier()
            * environmental
            * profile.multiplier;
        if seconds.is_finite() && seconds >= 1.0 {
            seconds.floor() as u64
        } else {
            1
        }
    }

    /// Arm a timer for `zone`, replacing any existing one. Returns the expiry.
    ///
    /// `seconds` saturates at [`MAX_OFFSET_SECS`].
    pub fn start(&self, zone: &ZoneId, seconds: u64) -> Timestamp {
        let seconds = seconds.min(MAX_OFFSET_SECS);
        let expires_at = add_seconds(now(), seconds);
        let started = Instant::now();
        let deadline = started
            .checked_add(Duration::from_secs(seconds))
            .unwrap_or_else(|| started + Duration::from_secs(FAR_FUTURE_SECS));

        let mut timers = lock(&self.timers);
        if let Some(previous) = timers.entries.remove(zone) {
            previous.handle.abort();
        }
        timers.next_generation += 1;
        let generation = timers.next_generation;

        let registry = Arc::clone(&self.timers);
        let bus = self.bus.clone();
        let expired_zone = zone.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            {
                let mut timers = lock(&registry);
                let current = timers
                    .entries
                    .get(&expired_zone)
                    .is_some_and(|timer| timer.generation == generation);
                if !current {
                    return;
                }
                timers.entries.remove(&expired_zone);
            }
            tracing::info!(zone = %expired_zone, "manual override timer expired");
            bus.publish(Event::timer_expired(expired_zone));
        });

        timers.entries.insert(
            zone.clone(),
            Timer {
                generation,
                expires_at,
                deadline,
                handle: task.abort_handle(),
            },
        );
        tracing::debug!(zone = %zone, seconds, %expires_at, "manual override timer started");
        expires_at
    }

    /// Cancel the zone's timer. Returns whether one was live.
    pub fn cancel(&self, zone: &ZoneId) -> bool {
        match lock(&self.timers).entries.remove(zone) {
            Some(timer) => {
                timer.handle.abort();
                tracing::debug!(zone = %zone, "manual override timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Seconds left on the zone's timer, rounded up; 0 when none is live.
    #[must_use]
    pub fn remaining(&self, zone: &ZoneId) -> u64 {
        lock(&self.timers).entries.get(zone).map_or(0, |timer| {
            let left = timer.deadline.saturating_duration_since(Instant::now());
            let millis = u64::try_from(left.as_millis()).unwrap_or(u64::MAX);
            millis.div_ceil(1000)
        })
    }

    #[must_use]
    pub fn expires_at(&self, zone: &ZoneId) -> Option<Timestamp> {
        lock(&self.timers)
            .entries
            .get(zone)
            .map(|timer| timer.expires_at)
    }

    /// Zones with a live timer, sorted.
    #[must_use]
    pub fn active_zones(&self) -> Vec<ZoneId> {
        let mut zones: Vec<ZoneId> = lock(&self.timers).entries.keys().cloned().collect();
        zones.sort();
        zones
    }

    pub fn set_mode(&self, mode: Mode) {
        lock(&self.factors).mode = mode;
    }

    /// Toggle the environmental boost. `factor` of `None` keeps the configured one.
    pub fn set_environmental(&self, active: bool, factor: Option<f64>) {
        let mut factors = lock(&self.factors);
        factors.environmental_active = active;
        factors.environmental_factor = factor
            .filter(|f| f.is_finite() && *f > 0.0)
            .unwrap_or(self.settings.environmental_boost_factor);
    }

    pub fn set_elevation(&self, elevation: Option<f64>) {
        lock(&self.factors).elevation = elevation;
    }

    /// Daytime when the sun is at or above the horizon, or when unknown.
    #[must_use]
    pub fn is_daytime(&self) -> bool {
        is_daytime(lock(&self.factors).elevation)
    }

    pub fn set_zone_profile(&self, zone: &ZoneId, multiplier: f64, environmental_enabled: bool) {
        lock(&self.factors).profiles.insert(
            zone.clone(),
            ZoneProfile {
                multiplier,
                environmental_enabled,
            },
        );
    }

    pub fn remove_zone_profile(&self, zone: &ZoneId) {
        lock(&self.factors).profiles.remove(zone);
    }
}

fn is_daytime(elevation: Option<f64>) -> bool {
    elevation.is_none_or(|e| e >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_domain::event::EventKind;
    use tokio::sync::mpsc;

    fn zone(name: &str) -> ZoneId {
        ZoneId::new(name).unwrap()
    }

    fn manager() -> TimerManager {
        TimerManager::new(
            EventBus::new(),
            TimerSettings {
                day_minutes: 60.0,
                night_minutes: 120.0,
                environmental_boost_factor: 1.5,
            },
        )
    }

    #[test]
    fn should_use_day_base_when_elevation_is_unknown() {
        let timers = manager();
        assert!(timers.is_daytime());
        assert_eq!(timers.compute_duration(&zone("living")), 3600);
    }

    #[test]
    fn should_use_night_base_when_sun_is_below_horizon() {
        let timers = manager();
        timers.set_elevation(Some(-4.0));
        assert_eq!(timers.compute_duration(&zone("living")), 7200);
        timers.set_elevation(Some(0.0));
        assert_eq!(timers.compute_duration(&zone("living")), 3600);
    }

    #[test]
    fn should_double_duration_when_zone_multiplier_doubles() {
        let timers = manager();
        timers.set_zone_profile(&zone("living"), 0.75, false);
        let single = timers.compute_duration(&zone("living"));
        timers.set_zone_profile(&zone("living"), 1.5, false);
        assert_eq!(timers.compute_duration(&zone("living")), single * 2);
    }

    #[test]
    fn should_apply_mode_multiplier() {
        let timers = manager();
        timers.set_mode(Mode::Focus);
        assert_eq!(timers.compute_duration(&zone("living")), 7200);
        timers.set_mode(Mode::LateNight);
        assert_eq!(timers.compute_duration(&zone("living")), 1800);
    }

    #[test]
    fn should_boost_only_when_active_and_eligible_and_automatic() {
        let timers = manager();
        timers.set_zone_profile(&zone("eligible"), 1.0, true);
        timers.set_zone_profile(&zone("opted_out"), 1.0, false);
        timers.set_environmental(true, None);

        assert_eq!(timers.compute_duration(&zone("eligible")), 5400);
        assert_eq!(timers.compute_duration(&zone("opted_out")), 3600);

        timers.set_mode(Mode::LateNight);
        assert_eq!(timers.compute_duration(&zone("eligible")), 1800);

        timers.set_mode(Mode::Automatic);
        timers.set_environmental(false, None);
        assert_eq!(timers.compute_duration(&zone("eligible")), 3600);
    }

    #[test]
    fn should_use_reported_factor_when_given() {
        let timers = manager();
        timers.set_zone_profile(&zone("eligible"), 1.0, true);
        timers.set_environmental(true, Some(2.0));
        assert_eq!(timers.compute_duration(&zone("eligible")), 7200);
    }

    #[test]
    fn should_never_compute_less_than_one_second() {
        let timers = manager();
        timers.set_zone_profile(&zone("living"), 0.0, false);
        assert_eq!(timers.compute_duration(&zone("living")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_remaining_and_clear_on_cancel() {
        let timers = manager();
        timers.start(&zone("living"), 90);
        tokio::time::advance(Duration::from_millis(30_500)).await;

        assert_eq!(timers.remaining(&zone("living")), 60);
        assert!(timers.expires_at(&zone("living")).is_some());

        assert!(timers.cancel(&zone("living")));
        assert!(!timers.cancel(&zone("living")));
        assert_eq!(timers.remaining(&zone("living")), 0);
        assert!(timers.active_zones().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_publish_timer_expired_and_forget_entry_when_fired() {
        let timers = manager();
        let (tx, mut rx) = mpsc::unbounded_channel();
        timers
            .bus
            .subscribe_sync(EventKind::TimerExpired, move |event| {
                let _ = tx.send(event.clone());
            });

        timers.start(&zone("living"), 5);
        let event = rx.recv().await.unwrap();

        assert_eq!(event, Event::timer_expired(zone("living")));
        assert_eq!(timers.remaining(&zone("living")), 0);
        assert!(timers.active_zones().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_replace_existing_timer_when_restarted() {
        let timers = manager();
        let (tx, mut rx) = mpsc::unbounded_channel();
        timers
            .bus
            .subscribe_sync(EventKind::TimerExpired, move |event| {
                let _ = tx.send((tokio::time::Instant::now(), event.clone()));
            });

        let start = tokio::time::Instant::now();
        timers.start(&zone("living"), 5);
        tokio::time::advance(Duration::from_secs(3)).await;
        timers.start(&zone("living"), 10);

        let (fired_at, _) = rx.recv().await.unwrap();
        assert!(fired_at.duration_since(start) >= Duration::from_secs(13));
        assert_eq!(timers.active_zones(), Vec::<ZoneId>::new());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_fire_when_cancelled() {
        let timers = manager();
        let (tx, mut rx) = mpsc::unbounded_channel();
        timers
            .bus
            .subscribe_sync(EventKind::TimerExpired, move |event| {
                let _ = tx.send(event.clone());
            });

        timers.start(&zone("living"), 5);
        timers.cancel(&zone("living"));
        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn should_saturate_timer_when_duration_is_huge() {
        let timers = manager();
        let (tx, mut rx) = mpsc::unbounded_channel();
        timers
            .bus
            .subscribe_sync(EventKind::TimerExpired, move |event| {
                let _ = tx.send(event.clone());
            });

        let before = now();
        let expires = timers.start(&zone("living"), u64::MAX);

        assert_eq!(timers.remaining(&zone("living")), MAX_OFFSET_SECS);
        assert_eq!(timers.expires_at(&zone("living")), Some(expires));
        assert!(expires >= add_seconds(before, MAX_OFFSET_SECS));
        tokio::time::advance(Duration::from_secs(3600)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(timers.active_zones(), vec![zone("living")]);
    }
}
