//! Zone registry — canonical zone configuration and the manual/enabled
//! state machine.
//!
//! Each zone is either idle or manual. Entering manual arms a timer through
//! the [`TimerManager`]; leaving it cancels the timer and clears the start
//! and expiry timestamps. Configuration changes push the zone multiplier and
//! environmental eligibility to the timer manager before returning.
//!
//! Lock order: the zone table first, then the timer manager.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use lumen_domain::error::{ErrorCode, LumenError, NotFoundError, ValidationError};
use lumen_domain::id::ZoneId;
use lumen_domain::snapshot::ZoneSnapshot;
use lumen_domain::time::{MAX_OFFSET_SECS, Timestamp, now};
use lumen_domain::zone::{ZoneConfig, ZoneState, ZoneUpdate};

use crate::lock;
use crate::timer_manager::TimerManager;

#[derive(Debug, Clone)]
struct ZoneEntry {
    config: ZoneConfig,
    state: ZoneState,
}

#[derive(Debug)]
pub struct ZoneRegistry {
    timers: Arc<TimerManager>,
    zones: Mutex<Vec<ZoneEntry>>,
}

fn not_found(zone: &ZoneId) -> NotFoundError {
    NotFoundError {
        entity: "zone",
        id: zone.to_string(),
    }
}

fn validate_all(configs: &[ZoneConfig]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(configs.len());
    for config in configs {
        config.validate()?;
        if !seen.insert(&config.id) {
            return Err(ValidationError::DuplicateZone(config.id.to_string()));
        }
    }
    Ok(())
}

impl ZoneRegistry {
    /// Build the registry from configuration, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an invalid multiplier or a
    /// duplicated zone id.
    pub fn new(timers: Arc<TimerManager>, configs: Vec<ZoneConfig>) -> Result<Self, ValidationError> {
        validate_all(&configs)?;
        for config in &configs {
            push_profile(&timers, config);
        }
        let zones = configs
            .into_iter()
            .map(|config| ZoneEntry {
                config,
                state: ZoneState::default(),
            })
            .collect();
        Ok(Self {
            timers,
            zones: Mutex::new(zones),
        })
    }

    #[must_use]
    pub fn timers(&self) -> &Arc<TimerManager> {
        &self.timers
    }

    fn with_zone<T>(
        &self,
        zone: &ZoneId,
        f: impl FnOnce(&mut ZoneEntry) -> T,
    ) -> Result<T, NotFoundError> {
        let mut zones = lock(&self.zones);
        let entry = zones
            .iter_mut()
            .find(|entry| &entry.config.id == zone)
            .ok_or_else(|| not_found(zone))?;
        Ok(f(entry))
    }

    /// Enter (or re-enter) manual state with a fresh timer of `duration_secs`.
    ///
    /// Returns the new expiry.
    pub fn start_manual(&self, zone: &ZoneId, duration_secs: u64) -> Result<Timestamp, NotFoundError> {
        let duration_secs = duration_secs.min(MAX_OFFSET_SECS);
        self.with_zone(zone, |entry| {
            let started = now();
            let expires = self.timers.start(zone, duration_secs);
            entry.state.enter_manual(started, duration_secs, expires);
            expires
        })
    }

    /// Leave manual state. Idempotent; returns whether the zone was manual.
    pub fn clear_manual(&self, zone: &ZoneId) -> Result<bool, NotFoundError> {
        self.with_zone(zone, |entry| {
            self.timers.cancel(zone);
            entry.state.clear_manual()
        })
    }

    /// `manual == true` starts an override of `duration_secs`, computed by
    /// the timer manager when `None`; `manual == false` clears it.
    pub fn set_manual(
        &self,
        zone: &ZoneId,
        manual: bool,
        duration_secs: Option<u64>,
    ) -> Result<(), NotFoundError> {
        if manual {
            let duration = duration_secs.unwrap_or_else(|| self.timers.compute_duration(zone));
            self.start_manual(zone, duration).map(|_| ())
        } else {
            self.clear_manual(zone).map(|_| ())
        }
    }

    /// Return every manual zone to idle. Returns the ids that changed.
    pub fn clear_all_manuals(&self) -> Vec<ZoneId> {
        let mut zones = lock(&self.zones);
        let mut changed = Vec::new();
        for entry in zones.iter_mut() {
            self.timers.cancel(&entry.config.id);
            if entry.state.clear_manual() {
                changed.push(entry.config.id.clone());
            }
        }
        changed
    }

    /// Re-arm a persisted override. Remaining time comes from the stored
    /// expiry; returns the re-armed seconds, or `None` when it already lapsed.
    pub fn restore_manual(
        &self,
        zone: &ZoneId,
        snapshot: &ZoneSnapshot,
        at: Timestamp,
    ) -> Result<Option<u64>, NotFoundError> {
        self.with_zone(zone, |entry| {
            let remaining = snapshot.remaining_at(at);
            let Some(expires) = snapshot.manual_expires.filter(|_| remaining > 0) else {
                return None;
            };
            self.timers.start(zone, remaining);
            let started = snapshot.manual_started.unwrap_or(at);
            let duration = if snapshot.manual_duration > 0 {
                snapshot.manual_duration
            } else {
                remaining
            };
            entry.state.enter_manual(started, duration, expires);
            Some(remaining)
        })
    }

    /// Apply several zone updates at once. Nothing changes if any is invalid.
    pub fn apply_overrides(&self, overrides: &BTreeMap<ZoneId, ZoneUpdate>) -> Result<(), LumenError> {
        let mut zones = lock(&self.zones);
        let mut updated = Vec::with_capacity(overrides.len());
        for (zone, update) in overrides {
            let index = zones
                .iter()
                .position(|entry| &entry.config.id == zone)
                .ok_or_else(|| not_found(zone))?;
            let mut config = zones[index].config.clone();
            update.apply_to(&mut config)?;
            updated.push((index, config));
        }
        for (index, config) in updated {
            push_profile(&self.timers, &config);
            zones[index].config = config;
        }
        Ok(())
    }

    /// Apply one update and return the resulting configuration.
    pub fn update_zone(&self, zone: &ZoneId, update: &ZoneUpdate) -> Result<ZoneConfig, LumenError> {
        let config = self.with_zone(zone, |entry| {
            let mut config = entry.config.clone();
            update.apply_to(&mut config)?;
            push_profile(&self.timers, &config);
            entry.config = config.clone();
            Ok::<_, ValidationError>(config)
        })??;
        Ok(config)
    }

    /// Returns whether the flag changed.
    pub fn set_enabled(&self, zone: &ZoneId, enabled: bool) -> Result<bool, NotFoundError> {
        self.with_zone(zone, |entry| {
            let changed = entry.config.enabled != enabled;
            entry.config.enabled = enabled;
            changed
        })
    }

    pub fn record_sync(
        &self,
        zone: &ZoneId,
        duration_ms: u64,
        error: Option<ErrorCode>,
    ) -> Result<(), NotFoundError> {
        self.with_zone(zone, |entry| {
            entry.state.last_sync_ms = Some(duration_ms);
            entry.state.last_error = error;
        })
    }

    pub fn zone(&self, zone: &ZoneId) -> Result<(ZoneConfig, ZoneState), NotFoundError> {
        self.with_zone(zone, |entry| (entry.config.clone(), entry.state.clone()))
    }

    /// Every zone in declaration order.
    #[must_use]
    pub fn zones(&self) -> Vec<(ZoneConfig, ZoneState)> {
        lock(&self.zones)
            .iter()
            .map(|entry| (entry.config.clone(), entry.state.clone()))
            .collect()
    }

    #[must_use]
    pub fn contains(&self, zone: &ZoneId) -> bool {
        lock(&self.zones).iter().any(|entry| &entry.config.id == zone)
    }

    #[must_use]
    pub fn is_manual(&self, zone: &ZoneId) -> bool {
        lock(&self.zones)
            .iter()
            .any(|entry| &entry.config.id == zone && entry.state.is_manual())
    }

    #[must_use]
    pub fn manual_zones(&self) -> Vec<ZoneId> {
        lock(&self.zones)
            .iter()
            .filter(|entry| entry.state.is_manual())
            .map(|entry| entry.config.id.clone())
            .collect()
    }

    #[must_use]
    pub fn any_manual(&self) -> bool {
        lock(&self.zones).iter().any(|entry| entry.state.is_manual())
    }

    /// Replace the whole configuration. Zones that survive keep their
    /// state; removed zones lose their timers and profiles.
    pub fn replace_all(&self, configs: Vec<ZoneConfig>) -> Result<(), ValidationError> {
        validate_all(&configs)?;
        let mut zones = lock(&self.zones);
        let mut previous: Vec<ZoneEntry> = std::mem::take(&mut *zones);

        for config in configs {
            push_profile(&self.timers, &config);
            let state = previous
                .iter()
                .position(|entry| entry.config.id == config.id)
                .map(|index| previous.swap_remove(index).state)
                .unwrap_or_default();
            zones.push(ZoneEntry { config, state });
        }
        for removed in previous {
            self.timers.cancel(&removed.config.id);
            self.timers.remove_zone_profile(&removed.config.id);
            tracing::info!(zone = %removed.config.id, "zone removed from configuration");
        }
        Ok(())
    }
}

fn push_profile(timers: &TimerManager, config: &ZoneConfig) {
    timers.set_zone_profile(&config.id, config.multiplier, config.environmental_boost);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventBus;
    use crate::timer_manager::TimerSettings;
    use lumen_domain::id::ControllerId;
    use lumen_domain::time::add_seconds;

    fn zone(name: &str) -> ZoneId {
        ZoneId::new(name).unwrap()
    }

    fn config(name: &str) -> ZoneConfig {
        ZoneConfig::new(zone(name), ControllerId::new(format!("switch.{name}")).unwrap())
    }

    fn registry(names: &[&str]) -> ZoneRegistry {
        let timers = Arc::new(TimerManager::new(EventBus::new(), TimerSettings::default()));
        ZoneRegistry::new(timers, names.iter().map(|name| config(name)).collect()).unwrap()
    }

    #[test]
    fn should_reject_duplicate_zone_ids() {
        let timers = Arc::new(TimerManager::new(EventBus::new(), TimerSettings::default()));
        let err = ZoneRegistry::new(timers, vec![config("living"), config("living")]).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateZone("living".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn should_record_start_and_expiry_when_entering_manual() {
        let registry = registry(&["living"]);
        let expires = registry.start_manual(&zone("living"), 600).unwrap();

        let (_, state) = registry.zone(&zone("living")).unwrap();
        assert!(state.is_manual());
        assert_eq!(state.manual_duration_secs, 600);
        assert_eq!(state.manual_expires, Some(expires));
        assert!(state.manual_started.is_some());
        assert_eq!(registry.timers().remaining(&zone("living")), 600);
    }

    #[tokio::test(start_paused = true)]
    async fn should_clear_timer_and_timestamps_when_leaving_manual() {
        let registry = registry(&["living"]);
        registry.set_manual(&zone("living"), true, Some(600)).unwrap();

        registry.set_manual(&zone("living"), false, None).unwrap();
        assert_eq!(registry.timers().remaining(&zone("living")), 0);
        registry.set_manual(&zone("living"), false, None).unwrap();
        assert_eq!(registry.timers().remaining(&zone("living")), 0);

        let (_, state) = registry.zone(&zone("living")).unwrap();
        assert!(!state.is_manual());
        assert_eq!(state.manual_started, None);
        assert_eq!(state.manual_expires, None);
    }

    #[tokio::test(start_paused = true)]
    async fn should_compute_duration_when_none_is_given() {
        let registry = registry(&["living"]);
        registry.set_manual(&zone("living"), true, None).unwrap();
        let (_, state) = registry.zone(&zone("living")).unwrap();
        assert_eq!(state.manual_duration_secs, 3600);
    }

    #[tokio::test(start_paused = true)]
    async fn should_return_changed_ids_when_clearing_all() {
        let registry = registry(&["living", "kitchen", "hall"]);
        registry.start_manual(&zone("living"), 60).unwrap();
        registry.start_manual(&zone("hall"), 60).unwrap();

        assert_eq!(registry.clear_all_manuals(), vec![zone("living"), zone("hall")]);
        assert!(registry.clear_all_manuals().is_empty());
        assert!(!registry.any_manual());
        assert!(registry.timers().active_zones().is_empty());
    }

    #[tokio::test]
    async fn should_return_not_found_when_zone_is_unknown() {
        let registry = registry(&["living"]);
        let err = registry.start_manual(&zone("garage"), 60).unwrap_err();
        assert_eq!(err.id, "garage");
        assert!(registry.clear_manual(&zone("garage")).is_err());
    }

    #[test]
    fn should_push_multiplier_to_timers_when_zone_is_updated() {
        let registry = registry(&["living"]);
        let before = registry.timers().compute_duration(&zone("living"));

        let config = registry
            .update_zone(
                &zone("living"),
                &ZoneUpdate {
                    multiplier: Some(2.0),
                    ..ZoneUpdate::default()
                },
            )
            .unwrap();

        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(registry.timers().compute_duration(&zone("living")), before * 2);
    }

    #[test]
    fn should_leave_every_zone_untouched_when_one_override_is_invalid() {
        let registry = registry(&["kitchen", "living"]);
        let mut overrides = BTreeMap::new();
        overrides.insert(
            zone("kitchen"),
            ZoneUpdate {
                multiplier: Some(3.0),
                ..ZoneUpdate::default()
            },
        );
        overrides.insert(
            zone("living"),
            ZoneUpdate {
                multiplier: Some(-1.0),
                ..ZoneUpdate::default()
            },
        );

        let err = registry.apply_overrides(&overrides).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        let (config, _) = registry.zone(&zone("kitchen")).unwrap();
        assert!((config.multiplier - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn should_push_environmental_eligibility_when_overrides_apply() {
        let registry = registry(&["living"]);
        registry.timers().set_environmental(true, Some(2.0));
        let mut overrides = BTreeMap::new();
        overrides.insert(
            zone("living"),
            ZoneUpdate {
                environmental_boost: Some(true),
                ..ZoneUpdate::default()
            },
        );

        registry.apply_overrides(&overrides).unwrap();
        assert_eq!(registry.timers().compute_duration(&zone("living")), 7200);
    }

    #[tokio::test(start_paused = true)]
    async fn should_restore_future_expiry_and_skip_past_one() {
        let registry = registry(&["living", "kitchen"]);
        let at = now();
        let future = ZoneSnapshot {
            manual_active: true,
            manual_duration: 900,
            manual_started: Some(add_seconds(at, 0)),
            manual_expires: Some(add_seconds(at, 300)),
            timer_remaining: 900,
        };
        let past = ZoneSnapshot {
            manual_expires: Some(at - chrono::Duration::seconds(10)),
            ..future.clone()
        };

        assert_eq!(registry.restore_manual(&zone("living"), &future, at).unwrap(), Some(300));
        assert_eq!(registry.restore_manual(&zone("kitchen"), &past, at).unwrap(), None);

        assert_eq!(registry.timers().remaining(&zone("living")), 300);
        assert_eq!(registry.manual_zones(), vec![zone("living")]);
        let (_, state) = registry.zone(&zone("living")).unwrap();
        assert_eq!(state.manual_expires, future.manual_expires);
    }

    #[test]
    fn should_record_sync_outcome() {
        let registry = registry(&["living"]);
        registry
            .record_sync(&zone("living"), 42, Some(ErrorCode::Timeout))
            .unwrap();
        let (_, state) = registry.zone(&zone("living")).unwrap();
        assert_eq!(state.last_sync_ms, Some(42));
        assert_eq!(state.last_error, Some(ErrorCode::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_surviving_state_and_cancel_removed_timers_when_replacing() {
        let registry = registry(&["living", "kitchen"]);
        registry.start_manual(&zone("living"), 60).unwrap();
        registry.start_manual(&zone("kitchen"), 60).unwrap();

        registry
            .replace_all(vec![config("living"), config("office")])
            .unwrap();

        let ids: Vec<ZoneId> = registry.zones().into_iter().map(|(c, _)| c.id).collect();
        assert_eq!(ids, vec![zone("living"), zone("office")]);
        assert!(registry.is_manual(&zone("living")));
        assert_eq!(registry.timers().active_zones(), vec![zone("living")]);
    }
}
