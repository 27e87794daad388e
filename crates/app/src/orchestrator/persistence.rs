//! Snapshot persistence: debounced saves and restore on startup.

use std::sync::Arc;

use lumen_domain::error::LumenError;
use lumen_domain::event::CalculationTrigger;
use lumen_domain::id::ZoneId;
use lumen_domain::snapshot::{Snapshot, ZoneSnapshot};
use lumen_domain::time::now;
use serde::Serialize;

use super::Orchestrator;
use crate::executor::Command;
use crate::lock;
use crate::ports::{LightController, SnapshotStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoredZone {
    pub zone: ZoneId,
    pub remaining_secs: u64,
}

/// What [`Orchestrator::restore`] brought back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    /// Overrides re-armed with the time they had left.
    pub restored: Vec<RestoredZone>,
    /// Overrides that lapsed while the process was down, or unknown zones.
    pub skipped: Vec<ZoneId>,
    pub sunset_boost_pct: i32,
}

impl<C, S> Orchestrator<C, S>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    /// Current persisted view: one entry per zone plus the sunset boost.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let at = now();
        let manual = self
            .zones
            .zones()
            .into_iter()
            .map(|(config, state)| {
                let entry = ZoneSnapshot {
                    manual_active: state.manual_active,
                    manual_duration: state.manual_duration_secs,
                    manual_started: state.manual_started,
                    manual_expires: state.manual_expires,
                    timer_remaining: state.remaining_secs(at),
                };
                (config.id, entry)
            })
            .collect();
        Snapshot {
            manual,
            sunset_boost_pct: lock(&self.state).sunset_boost_pct,
        }
    }

    /// Save after the debounce window; a newer request supersedes a pending one.
    pub(super) fn schedule_save(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no runtime, snapshot save skipped");
            return;
        };
        let weak = Arc::downgrade(self);
        let debounce = self.settings.save_debounce;
        let handle = runtime
            .spawn(async move {
                tokio::time::sleep(debounce).await;
                if let Some(this) = weak.upgrade() {
                    lock(&this.tasks).pending_save = None;
                    // errors are logged inside
                    let _ = this.save_now().await;
                }
            })
            .abort_handle();
        if let Some(previous) = lock(&self.tasks).pending_save.replace(handle) {
            previous.abort();
        }
    }

    /// Persist the snapshot immediately.
    ///
    /// # Errors
    ///
    /// Returns the storage error; the in-memory state is unaffected.
    pub async fn save_now(&self) -> Result<(), LumenError> {
        let snapshot = self.snapshot();
        let manual = snapshot.manual.values().filter(|z| z.manual_active).count();
        match self.store.save(snapshot).await {
            Ok(()) => {
                tracing::debug!(manual, "snapshot saved");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to save snapshot");
                Err(err)
            }
        }
    }

    /// Reload the persisted snapshot and re-arm overrides that are still
    /// running. Remaining time is derived from the stored absolute expiry,
    /// so downtime counts against the override.
    ///
    /// # Errors
    ///
    /// Returns the storage error when the snapshot cannot be loaded.
    #[tracing::instrument(skip(self))]
    pub async fn restore(self: &Arc<Self>) -> Result<RestoreReport, LumenError> {
        let _beat = self.watchdog.heartbeat("command:restore");
        let Some(snapshot) = self.store.load().await? else {
            tracing::info!("no snapshot to restore");
            return Ok(RestoreReport::default());
        };

        lock(&self.state).sunset_boost_pct = snapshot.sunset_boost_pct;
        let at = now();
        let mut report = RestoreReport {
            sunset_boost_pct: snapshot.sunset_boost_pct,
            ..RestoreReport::default()
        };

        for (zone, entry) in &snapshot.manual {
            if !entry.manual_active {
                continue;
            }
            match self.zones.restore_manual(zone, entry, at) {
                Ok(Some(remaining_secs)) => {
                    report.restored.push(RestoredZone {
                        zone: zone.clone(),
                        remaining_secs,
                    });
                }
                Ok(None) => {
                    tracing::info!(zone = %zone, "persisted override already lapsed");
                    report.skipped.push(zone.clone());
                }
                Err(err) => {
                    tracing::warn!(zone = %zone, error = %err, "persisted override for unknown zone");
                    report.skipped.push(zone.clone());
                }
            }
        }

        for restored in &report.restored {
            let Ok((config, _)) = self.zones.zone(&restored.zone) else {
                continue;
            };
            let outcome = self
                .executor
                .execute(Command::SetManualControl {
                    zone: restored.zone.clone(),
                    lights: config.lights,
                    manual: true,
                })
                .await;
            if !outcome.is_ok() {
                tracing::warn!(zone = %restored.zone, error_code = ?outcome.error_code, "failed to raise manual flag");
            }
        }

        tracing::info!(
            restored = report.restored.len(),
            skipped = report.skipped.len(),
            sunset_boost_pct = report.sunset_boost_pct,
            "snapshot restored"
        );
        self.recompute(CalculationTrigger::Restore, self.all_zone_ids());
        Ok(report)
    }
}
