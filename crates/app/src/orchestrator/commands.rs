//! Command surface: sync, adjust, mode/scene selection, zone toggles,
//! preferences backup and global pause.

use std::collections::BTreeMap;
use std::sync::Arc;

use lumen_domain::adjustment::{AdjustmentComponents, ZoneAdjustment};
use lumen_domain::error::{CommandError, ErrorCode, LumenError};
use lumen_domain::event::CalculationTrigger;
use lumen_domain::id::ZoneId;
use lumen_domain::light::{LightState, clamp_brightness, clamp_color_temp};
use lumen_domain::mode::Mode;
use lumen_domain::scene::Scene;
use lumen_domain::time::now;
use lumen_domain::zone::{ZoneConfig, ZoneUpdate};
use serde::Serialize;
use tokio::task::JoinSet;

use super::handlers::Release;
use super::{Orchestrator, PreferencesBackup, ZonePreferences};
use crate::executor::{Command, ExecutionOutcome};
use crate::lock;
use crate::metrics::DailyCounter;
use crate::ports::{ApplyRequest, ApplyTarget, LightController, SnapshotStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneSyncResult {
    pub zone: ZoneId,
    #[serde(flatten)]
    pub outcome: ExecutionOutcome,
}

/// Aggregate of one sync batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub zones: Vec<ZoneSyncResult>,
    pub synced: usize,
    pub failed: usize,
    pub rate_limited: usize,
    pub total_duration_ms: u64,
}

impl SyncReport {
    fn from_results(mut zones: Vec<ZoneSyncResult>) -> Self {
        zones.sort_by(|a, b| a.zone.cmp(&b.zone));
        let mut report = Self::default();
        for result in &zones {
            if result.outcome.is_ok() {
                report.synced += 1;
            } else if result.outcome.is_rate_limited() {
                report.rate_limited += 1;
            } else {
                report.failed += 1;
            }
            report.total_duration_ms = report
                .total_duration_ms
                .saturating_add(result.outcome.duration_ms);
        }
        report.zones = zones;
        report
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneAdjustResult {
    pub zone: ZoneId,
    pub brightness_pct: Option<u8>,
    pub color_temp_kelvin: Option<u32>,
    /// `None` when the current light state was unknown and nothing was sent.
    pub outcome: Option<ExecutionOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdjustReport {
    pub zones: Vec<ZoneAdjustResult>,
    pub components: AdjustmentComponents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeChange {
    pub previous: Mode,
    pub mode: Mode,
    pub sync: Option<SyncReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneChange {
    pub previous: Scene,
    pub scene: Scene,
    pub sync: Option<SyncReport>,
}

impl<C, S> Orchestrator<C, S>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    /// Apply the composed adjustment to every enabled, non-manual zone in
    /// scope. Zones are synced independently; one failure never stops the
    /// others.
    ///
    /// # Errors
    ///
    /// [`CommandError::Paused`] while paused, or a not-found error for an
    /// unknown `zone`.
    #[tracing::instrument(skip(self))]
    pub async fn force_sync(
        self: &Arc<Self>,
        zone: Option<&ZoneId>,
    ) -> Result<SyncReport, LumenError> {
        let _beat = self.watchdog.heartbeat("command:force_sync");
        let components = {
            let state = lock(&self.state);
            if state.paused {
                return Err(CommandError::Paused.into());
            }
            state.components
        };
        if let Some(zone) = zone {
            self.zones.zone(zone)?;
        }

        let mut tasks = JoinSet::new();
        for (config, state) in self.zones.zones() {
            if !config.enabled || state.is_manual() || zone.is_some_and(|z| z != &config.id) {
                continue;
            }
            let adjustment = components.for_zone(&config);
            let this = Arc::clone(self);
            tasks.spawn(async move { this.sync_zone(config, adjustment).await });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => tracing::warn!(error = %err, "zone sync task aborted"),
            }
        }

        let report = SyncReport::from_results(results);
        self.counters.increment(DailyCounter::Syncs);
        tracing::info!(
            synced = report.synced,
            failed = report.failed,
            rate_limited = report.rate_limited,
            total_duration_ms = report.total_duration_ms,
            "sync completed"
        );
        Ok(report)
    }

    async fn sync_zone(&self, config: ZoneConfig, adjustment: ZoneAdjustment) -> ZoneSyncResult {
        let outcome = self
            .executor
            .execute(Command::Apply(ApplyRequest {
                zone: config.id.clone(),
                controller: config.controller,
                lights: config.lights,
                target: ApplyTarget::Adaptive(adjustment),
                transition: self.settings.transition,
            }))
            .await;
        if let Err(err) = self
            .zones
            .record_sync(&config.id, outcome.duration_ms, outcome.error_code)
        {
            tracing::debug!(zone = %config.id, error = %err, "zone removed during sync");
        }
        ZoneSyncResult {
            zone: config.id,
            outcome,
        }
    }

    /// Follow-up sync after a state change; a paused orchestrator skips it.
    pub(super) async fn sync_quietly(
        self: &Arc<Self>,
        zone: Option<&ZoneId>,
    ) -> Option<SyncReport> {
        match self.force_sync(zone).await {
            Ok(report) => Some(report),
            Err(err) if err.code() == ErrorCode::Paused => {
                tracing::debug!("follow-up sync skipped while paused");
                None
            }
            Err(err) => {
                tracing::warn!(error_code = %err.code(), error = %err, "follow-up sync failed");
                None
            }
        }
    }

    /// Put each eligible zone under manual control, then step brightness
    /// and/or color temperature from its current value.
    ///
    /// Eligible zones are enabled and either idle or already manual because
    /// of an earlier adjustment, so repeated adjustments keep stacking and
    /// each one restarts the full override duration.
    ///
    /// # Errors
    ///
    /// [`CommandError::NoAdjustment`] when neither step is given,
    /// [`CommandError::NoTargetZone`] when no zone is eligible.
    #[tracing::instrument(skip(self))]
    pub async fn adjust(
        self: &Arc<Self>,
        brightness_step: Option<i32>,
        color_temp_step: Option<i32>,
    ) -> Result<AdjustReport, LumenError> {
        let _beat = self.watchdog.heartbeat("command:adjust");
        let brightness = brightness_step.filter(|step| *step != 0);
        let color_temp = color_temp_step.filter(|step| *step != 0);
        if brightness.is_none() && color_temp.is_none() {
            return Err(CommandError::NoAdjustment.into());
        }

        // Targets enter manual inside the same critical section that adds
        // the totals, so a concurrent release never sees them idle.
        let (targets, forced_from) = {
            let mut state = lock(&self.state);
            let targets: Vec<ZoneConfig> = self
                .zones
                .zones()
                .into_iter()
                .filter(|(config, zone)| {
                    config.enabled
                        && (!zone.is_manual() || state.adjusted_zones.contains(&config.id))
                })
                .map(|(config, _)| config)
                .collect();
            if targets.is_empty() {
                return Err(CommandError::NoTargetZone.into());
            }
            let durations: Vec<u64> = targets
                .iter()
                .map(|config| self.timers.compute_duration(&config.id))
                .collect();
            let mut forced_from = None;
            for (config, duration) in targets.iter().zip(durations) {
                match self.enter_manual_locked(&mut state, &config.id, duration) {
                    Ok((_, left)) => forced_from = forced_from.or(left),
                    Err(err) => {
                        tracing::warn!(zone = %config.id, error = %err, "zone vanished before manual start");
                    }
                }
            }
            state.manual = state
                .manual
                .add(brightness.unwrap_or(0), color_temp.unwrap_or(0));
            state.flags.record(brightness, color_temp);
            state
                .adjusted_zones
                .extend(targets.iter().map(|config| config.id.clone()));
            (targets, forced_from)
        };
        if let Some(previous) = forced_from {
            tracing::info!(%previous, "adjustment forces automatic mode");
        }
        self.counters.increment(DailyCounter::Adjustments);
        for _ in &targets {
            self.counters.increment(DailyCounter::ManualOverrides);
        }

        let mut tasks = JoinSet::new();
        for config in targets {
            let this = Arc::clone(self);
            tasks.spawn(async move { this.adjust_zone(config, brightness, color_temp).await });
        }
        let mut zones = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => zones.push(result),
                Err(err) => tracing::warn!(error = %err, "zone adjust task aborted"),
            }
        }
        zones.sort_by(|a, b| a.zone.cmp(&b.zone));

        let ids = zones.iter().map(|result| result.zone.clone()).collect();
        let trigger = if forced_from.is_some() {
            CalculationTrigger::Mode
        } else {
            CalculationTrigger::Manual
        };
        let components = self.recompute(trigger, ids);
        self.schedule_save();
        Ok(AdjustReport { zones, components })
    }

    async fn adjust_zone(
        &self,
        config: ZoneConfig,
        brightness: Option<i32>,
        color_temp: Option<i32>,
    ) -> ZoneAdjustResult {
        let current = self.current_light_state(&config).await;
        let brightness_pct = brightness.zip(current.and_then(|s| s.brightness_pct)).map(
            |(step, pct)| clamp_brightness(i32::from(pct).saturating_add(step)),
        );
        let color_temp_kelvin = color_temp
            .zip(current.and_then(|s| s.color_temp_kelvin()))
            .map(|(step, kelvin)| clamp_color_temp(i64::from(kelvin) + i64::from(step)));

        let outcome = if brightness_pct.is_some() || color_temp_kelvin.is_some() {
            let outcome = self
                .executor
                .execute(Command::Apply(ApplyRequest {
                    zone: config.id.clone(),
                    controller: config.controller.clone(),
                    lights: config.lights.clone(),
                    target: ApplyTarget::Explicit {
                        brightness_pct,
                        color_temp_kelvin,
                    },
                    transition: self.settings.transition,
                }))
                .await;
            Some(outcome)
        } else {
            tracing::warn!(zone = %config.id, "no current light state to adjust from");
            None
        };

        tracing::info!(zone = %config.id, ?brightness_pct, ?color_temp_kelvin, "zone adjusted");
        let flag = self
            .executor
            .execute(Command::SetManualControl {
                zone: config.id.clone(),
                lights: config.lights.clone(),
                manual: true,
            })
            .await;
        if !flag.is_ok() {
            tracing::warn!(zone = %config.id, error_code = ?flag.error_code, "failed to raise manual flag");
        }
        ZoneAdjustResult {
            zone: config.id,
            brightness_pct,
            color_temp_kelvin,
            outcome,
        }
    }

    /// First known state among the zone's lights.
    async fn current_light_state(&self, config: &ZoneConfig) -> Option<LightState> {
        for light in &config.lights {
            match self.executor.light_state(light).await {
                Ok(Some(state)) => return Some(state),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(zone = %config.id, light = %light, error = %err, "failed to read light state");
                }
            }
        }
        None
    }

    /// Select the global mode. An explicit selection forgets any mode
    /// remembered by a manual override; leaving automatic resets the scene.
    ///
    /// # Errors
    ///
    /// Never fails today; the signature matches the rest of the surface.
    #[tracing::instrument(skip(self))]
    pub async fn select_mode(self: &Arc<Self>, mode: Mode) -> Result<ModeChange, LumenError> {
        let _beat = self.watchdog.heartbeat("command:select_mode");
        let previous = {
            let mut state = lock(&self.state);
            let previous = state.mode;
            state.remembered_mode = None;
            self.set_mode_locked(&mut state, mode);
            previous
        };
        tracing::info!(%previous, %mode, "mode selected");
        self.recompute(CalculationTrigger::Mode, self.all_zone_ids());
        let sync = self.sync_quietly(None).await;
        Ok(ModeChange {
            previous,
            mode,
            sync,
        })
    }

    /// Select a scene. Only allowed in automatic mode.
    ///
    /// # Errors
    ///
    /// [`CommandError::ModeBlocked`] outside automatic mode; nothing changes.
    #[tracing::instrument(skip(self))]
    pub async fn select_scene(self: &Arc<Self>, scene: Scene) -> Result<SceneChange, LumenError> {
        let _beat = self.watchdog.heartbeat("command:select_scene");
        let previous = {
            let mut state = lock(&self.state);
            if !state.mode.is_automatic() {
                return Err(CommandError::ModeBlocked { mode: state.mode }.into());
            }
            std::mem::replace(&mut state.scene, scene)
        };
        tracing::info!(%previous, %scene, "scene selected");
        self.recompute(CalculationTrigger::Scene, self.all_zone_ids());
        let sync = self.sync_quietly(None).await;
        Ok(SceneChange {
            previous,
            scene,
            sync,
        })
    }

    /// Returns whether the zone was disabled before.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown zone.
    pub async fn enable_zone(self: &Arc<Self>, zone: &ZoneId) -> Result<bool, LumenError> {
        let _beat = self.watchdog.heartbeat("command:enable_zone");
        let changed = self.zones.set_enabled(zone, true)?;
        if changed {
            tracing::info!(zone = %zone, "zone enabled");
            self.sync_quietly(Some(zone)).await;
        }
        Ok(changed)
    }

    /// Disable a zone; a manual override on it is released.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown zone.
    pub async fn disable_zone(self: &Arc<Self>, zone: &ZoneId) -> Result<bool, LumenError> {
        let _beat = self.watchdog.heartbeat("command:disable_zone");
        let changed = self.zones.set_enabled(zone, false)?;
        if changed {
            tracing::info!(zone = %zone, "zone disabled");
        }
        if self.zones.is_manual(zone) {
            self.release_zone(zone, Release::Disabled, None).await;
        }
        Ok(changed)
    }

    /// Toggle a zone's participation in the environmental and sunset boosts.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown zone.
    pub async fn set_zone_boost(
        self: &Arc<Self>,
        zone: &ZoneId,
        environmental: Option<bool>,
        sunset: Option<bool>,
    ) -> Result<ZoneConfig, LumenError> {
        let _beat = self.watchdog.heartbeat("command:set_zone_boost");
        let update = ZoneUpdate {
            environmental_boost: environmental,
            sunset_boost: sunset,
            ..ZoneUpdate::default()
        };
        if update.is_empty() {
            return Ok(self.zones.zone(zone)?.0);
        }
        let config = self.zones.update_zone(zone, &update)?;
        tracing::info!(zone = %zone, ?environmental, ?sunset, "zone boost flags updated");
        self.recompute(CalculationTrigger::ZoneConfig, vec![zone.clone()]);
        self.sync_quietly(Some(zone)).await;
        Ok(config)
    }

    /// Capture mode, scene and per-zone tunables, replacing any earlier backup.
    pub fn backup_preferences(&self) -> PreferencesBackup {
        let _beat = self.watchdog.heartbeat("command:backup_preferences");
        let zones = self
            .zones
            .zones()
            .iter()
            .map(|(config, _)| (config.id.clone(), ZonePreferences::from(config)))
            .collect();
        let mut state = lock(&self.state);
        let backup = PreferencesBackup {
            mode: state.mode,
            scene: state.scene,
            zones,
            created_at: now(),
        };
        state.backup = Some(backup.clone());
        tracing::info!("preferences backed up");
        backup
    }

    /// Reapply the last backup. Zones that no longer exist are skipped.
    ///
    /// # Errors
    ///
    /// [`CommandError::NoBackup`] when no backup was taken.
    pub async fn restore_preferences(self: &Arc<Self>) -> Result<PreferencesBackup, LumenError> {
        let _beat = self.watchdog.heartbeat("command:restore_preferences");
        let backup = lock(&self.state)
            .backup
            .clone()
            .ok_or(CommandError::NoBackup)?;

        let overrides: BTreeMap<ZoneId, ZoneUpdate> = backup
            .zones
            .iter()
            .filter(|(zone, _)| self.zones.contains(zone))
            .map(|(zone, prefs)| {
                let update = ZoneUpdate {
                    multiplier: Some(prefs.multiplier),
                    sunrise_offset_minutes: Some(prefs.sunrise_offset_minutes),
                    environmental_boost: Some(prefs.environmental_boost),
                    sunset_boost: Some(prefs.sunset_boost),
                    ..ZoneUpdate::default()
                };
                (zone.clone(), update)
            })
            .collect();
        self.zones.apply_overrides(&overrides)?;

        {
            let mut state = lock(&self.state);
            state.remembered_mode = None;
            self.set_mode_locked(&mut state, backup.mode);
            if backup.mode.is_automatic() {
                state.scene = backup.scene;
            }
        }
        tracing::info!(mode = %backup.mode, scene = %backup.scene, "preferences restored");
        self.recompute(CalculationTrigger::Restore, self.all_zone_ids());
        self.sync_quietly(None).await;
        Ok(backup)
    }

    /// Returns whether the orchestrator was running before.
    pub fn pause(&self) -> bool {
        let _beat = self.watchdog.heartbeat("command:pause");
        let changed = !std::mem::replace(&mut lock(&self.state).paused, true);
        if changed {
            tracing::info!("orchestrator paused");
        }
        changed
    }

    /// Resume and resynchronise every zone. Returns whether it was paused.
    pub async fn resume(self: &Arc<Self>) -> bool {
        let _beat = self.watchdog.heartbeat("command:resume");
        let changed = std::mem::replace(&mut lock(&self.state).paused, false);
        if changed {
            tracing::info!("orchestrator resumed");
            self.sync_quietly(None).await;
        }
        changed
    }

    /// Return one zone to adaptive control. Returns whether it was manual.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown zone.
    pub async fn reset_zone(self: &Arc<Self>, zone: &ZoneId) -> Result<bool, LumenError> {
        let _beat = self.watchdog.heartbeat("command:reset_zone");
        self.zones.zone(zone)?;
        Ok(self
            .release_zone(zone, Release::Reset, None)
            .await
            .unwrap_or(false))
    }

    /// Return every manual zone to adaptive control. Returns the ids that
    /// were manual; empty when none were.
    ///
    /// # Errors
    ///
    /// Never fails today; the signature matches the rest of the surface.
    pub async fn reset_all(self: &Arc<Self>) -> Result<Vec<ZoneId>, LumenError> {
        let _beat = self.watchdog.heartbeat("command:reset_all");
        let changed = self.zones.clear_all_manuals();
        let restored = self.settle_after_release(&changed);
        tracing::info!(zones = changed.len(), "every zone reset to adaptive control");

        for zone in &changed {
            let Ok((config, _)) = self.zones.zone(zone) else {
                continue;
            };
            let outcome = self
                .executor
                .execute(Command::SetManualControl {
                    zone: zone.clone(),
                    lights: config.lights,
                    manual: false,
                })
                .await;
            if !outcome.is_ok() {
                tracing::warn!(zone = %zone, error_code = ?outcome.error_code, "failed to clear manual flag");
            }
        }

        let trigger = if restored.is_some() {
            CalculationTrigger::Mode
        } else {
            CalculationTrigger::Reset
        };
        self.recompute(trigger, changed.clone());
        if !changed.is_empty() {
            self.schedule_save();
        }
        self.sync_quietly(None).await;
        Ok(changed)
    }
}
