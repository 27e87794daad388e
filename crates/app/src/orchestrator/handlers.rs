//! Inbound event handlers.

use std::sync::Arc;

use lumen_domain::adjustment::{EnvironmentalInput, ManualTotals};
use lumen_domain::error::NotFoundError;
use lumen_domain::event::{CalculationTrigger, EnvironmentalReport, Event};
use lumen_domain::id::{LightId, ZoneId};
use lumen_domain::mode::Mode;
use lumen_domain::time::Timestamp;

use super::{Orchestrator, RuntimeState};
use crate::executor::Command;
use crate::lock;
use crate::metrics::DailyCounter;
use crate::ports::{LightController, SnapshotStore};

/// Why a zone leaves manual state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Release {
    TimerExpired,
    Released,
    Reset,
    Disabled,
}

impl Release {
    fn trigger(self) -> CalculationTrigger {
        match self {
            Self::TimerExpired | Self::Released => CalculationTrigger::Manual,
            Self::Reset => CalculationTrigger::Reset,
            Self::Disabled => CalculationTrigger::ZoneConfig,
        }
    }
}

impl<C, S> Orchestrator<C, S>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    pub(super) async fn handle_event(self: &Arc<Self>, event: Event) {
        let kind = event.kind();
        self.metrics.record_event(kind);
        let name = format!("event:{kind}");
        let _beat = self.watchdog.heartbeat(&name);

        if let Err(err) = event.validate() {
            tracing::warn!(%kind, error = %err, "discarding invalid event");
            return;
        }

        match event {
            Event::ManualDetected {
                zone,
                duration_secs,
            } => self.on_manual_detected(zone, duration_secs).await,
            Event::ManualReleased {
                zone,
                source,
                previous_lights,
            } => {
                tracing::debug!(zone = %zone, ?source, "manual control released externally");
                self.release_zone(&zone, Release::Released, previous_lights)
                    .await;
            }
            Event::TimerExpired { zone } => {
                // a timer re-armed after this one fired supersedes it
                if self.timers.expires_at(&zone).is_some() {
                    tracing::debug!(zone = %zone, "ignoring stale timer expiration");
                    return;
                }
                self.release_zone(&zone, Release::TimerExpired, None).await;
            }
            Event::EnvironmentalChanged(report) => self.on_environmental_changed(report).await,
            Event::ButtonPressed {
                device,
                button,
                action,
            } => self.on_button_pressed(&device, &button, &action).await,
            Event::AnchorChanged { anchor } => self.on_anchor_changed(anchor),
            Event::CalculationCompleted(_) => {}
        }
    }

    /// Enter manual state. A non-automatic mode is remembered and replaced
    /// by automatic until every zone is idle again.
    async fn on_manual_detected(self: &Arc<Self>, zone: ZoneId, duration_secs: Option<u64>) {
        let config = match self.zones.zone(&zone) {
            Ok((config, _)) => config,
            Err(err) => {
                tracing::warn!(zone = %zone, error = %err, "manual override for unknown zone");
                return;
            }
        };
        if !config.enabled {
            tracing::debug!(zone = %zone, "ignoring manual override on disabled zone");
            return;
        }

        let duration = duration_secs
            .filter(|secs| *secs > 0)
            .unwrap_or_else(|| self.timers.compute_duration(&zone));

        let entered = {
            let mut state = lock(&self.state);
            self.enter_manual_locked(&mut state, &zone, duration)
        };
        let (expires, forced_from) = match entered {
            Ok(entered) => entered,
            Err(err) => {
                tracing::warn!(zone = %zone, error = %err, "zone vanished before manual start");
                return;
            }
        };
        if let Some(previous) = forced_from {
            tracing::info!(zone = %zone, %previous, "manual override forces automatic mode");
        }
        self.counters.increment(DailyCounter::ManualOverrides);
        tracing::info!(zone = %zone, duration_secs = duration, %expires, "zone entered manual control");

        let outcome = self
            .executor
            .execute(Command::SetManualControl {
                zone: zone.clone(),
                lights: config.lights.clone(),
                manual: true,
            })
            .await;
        if !outcome.is_ok() {
            tracing::warn!(zone = %zone, error_code = ?outcome.error_code, "failed to raise manual flag");
        }

        let trigger = if forced_from.is_some() {
            CalculationTrigger::Mode
        } else {
            CalculationTrigger::Manual
        };
        self.recompute(trigger, vec![zone]);
        self.schedule_save();
    }

    /// Arm a manual override, then leave any non-automatic mode and
    /// remember it. The mode is untouched when the zone is unknown.
    ///
    /// Returns the expiry and the mode that was left.
    pub(super) fn enter_manual_locked(
        &self,
        state: &mut RuntimeState,
        zone: &ZoneId,
        duration_secs: u64,
    ) -> Result<(Timestamp, Option<Mode>), NotFoundError> {
        let expires = self.zones.start_manual(zone, duration_secs)?;
        if state.mode.is_automatic() {
            return Ok((expires, None));
        }
        let previous = state.mode;
        if state.remembered_mode.is_none() {
            state.remembered_mode = Some(previous);
        }
        self.set_mode_locked(state, Mode::Automatic);
        Ok((expires, Some(previous)))
    }

    /// Leave manual state for one zone. When no zone stays manual the
    /// manual totals are cleared and a remembered mode is restored.
    ///
    /// Returns whether the zone was manual, `None` for an unknown zone.
    pub(super) async fn release_zone(
        self: &Arc<Self>,
        zone: &ZoneId,
        reason: Release,
        lights: Option<Vec<LightId>>,
    ) -> Option<bool> {
        let (config, _) = match self.zones.zone(zone) {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(zone = %zone, ?reason, error = %err, "release for unknown zone");
                return None;
            }
        };
        let was_manual = self.zones.clear_manual(zone).unwrap_or(false);
        let restored = self.settle_after_release(std::slice::from_ref(zone));
        tracing::info!(zone = %zone, ?reason, was_manual, "zone returned to adaptive control");

        let outcome = self
            .executor
            .execute(Command::SetManualControl {
                zone: zone.clone(),
                lights: lights.unwrap_or(config.lights),
                manual: false,
            })
            .await;
        if !outcome.is_ok() {
            tracing::warn!(zone = %zone, error_code = ?outcome.error_code, "failed to clear manual flag");
        }

        let trigger = if restored.is_some() {
            CalculationTrigger::Mode
        } else {
            reason.trigger()
        };
        self.recompute(trigger, vec![zone.clone()]);
        self.schedule_save();

        if reason != Release::Disabled {
            if restored.is_some() {
                self.sync_quietly(None).await;
            } else {
                self.sync_quietly(Some(zone)).await;
            }
        }
        Some(was_manual)
    }

    /// Bookkeeping shared by every release path. Returns the restored mode.
    pub(super) fn settle_after_release(&self, released: &[ZoneId]) -> Option<Mode> {
        let restored = {
            let mut state = lock(&self.state);
            for zone in released {
                state.adjusted_zones.remove(zone);
            }
            if self.zones.any_manual() {
                None
            } else {
                state.manual = ManualTotals::default();
                state.flags.clear();
                state.adjusted_zones.clear();
                let restored = state.remembered_mode.take();
                if let Some(mode) = restored {
                    self.set_mode_locked(&mut state, mode);
                }
                restored
            }
        };
        if let Some(mode) = restored {
            tracing::info!(%mode, "every zone is idle, remembered mode restored");
        }
        restored
    }

    async fn on_environmental_changed(self: &Arc<Self>, report: EnvironmentalReport) {
        let input = EnvironmentalInput {
            active: report.boost_active,
            boost_pct: report.boost_pct.unwrap_or(0),
        };
        let (environmental_changed, sunset_changed) = {
            let mut state = lock(&self.state);
            let environmental_changed = state.environmental != input;
            state.environmental = input;
            let sunset_changed = match report.sunset_boost_pct {
                Some(pct) if pct != state.sunset_boost_pct => {
                    state.sunset_boost_pct = pct;
                    true
                }
                _ => false,
            };
            state.environmental_report = Some(report.clone());
            (environmental_changed, sunset_changed)
        };

        self.timers
            .set_environmental(report.boost_active, report.multiplier);
        if let Some(elevation) = report.elevation {
            self.timers.set_elevation(Some(elevation));
        }

        if !environmental_changed && !sunset_changed {
            tracing::debug!("environmental report without effective change");
            return;
        }
        tracing::info!(
            boost_active = report.boost_active,
            boost_pct = input.boost_pct,
            sunset_changed,
            "environmental conditions changed"
        );

        let trigger = if environmental_changed {
            CalculationTrigger::Environmental
        } else {
            CalculationTrigger::Sunset
        };
        self.recompute(trigger, self.all_zone_ids());
        if sunset_changed {
            self.schedule_save();
        }
        self.sync_quietly(None).await;
    }

    async fn on_button_pressed(self: &Arc<Self>, device: &str, button: &str, action: &str) {
        if action != "press" {
            tracing::debug!(device, button, action, "ignoring button action");
            return;
        }
        let brightness = self.settings.button_brightness_step;
        let warmth = self.settings.button_color_temp_step;
        let result = match button {
            "brighter" => self.adjust(Some(brightness), None).await.map(|_| ()),
            "dimmer" => self.adjust(Some(-brightness), None).await.map(|_| ()),
            "cooler" => self.adjust(None, Some(warmth)).await.map(|_| ()),
            "warmer" => self.adjust(None, Some(-warmth)).await.map(|_| ()),
            "reset" => self.reset_all().await.map(|_| ()),
            _ => {
                tracing::debug!(device, button, "ignoring unmapped button");
                return;
            }
        };
        if let Err(err) = result {
            tracing::warn!(device, button, error_code = %err.code(), error = %err, "button command failed");
        }
    }

    fn on_anchor_changed(self: &Arc<Self>, anchor: Option<Timestamp>) {
        lock(&self.state).anchor = anchor;
        tracing::info!(?anchor, "alarm anchor changed");
        if self.settings.anchor_enabled {
            self.schedule_anchor_syncs();
        }
    }
}
