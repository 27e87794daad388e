//! Sunrise syncs aligned on the alarm anchor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as TimeDelta;
use lumen_domain::error::{CommandError, LumenError};
use lumen_domain::id::ZoneId;
use lumen_domain::time::{Timestamp, now, seconds_until};
use serde::Serialize;

use super::Orchestrator;
use crate::lock;
use crate::ports::{LightController, SnapshotStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledSync {
    pub zone: ZoneId,
    pub at: Timestamp,
}

/// Sunrise syncs currently armed for the stored anchor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnchorSchedule {
    pub anchor: Option<Timestamp>,
    pub syncs: Vec<ScheduledSync>,
}

impl<C, S> Orchestrator<C, S>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    /// Replace every armed sunrise sync with one per enabled zone at
    /// `anchor + sunrise_offset_minutes`. Times already passed are skipped.
    pub(super) fn schedule_anchor_syncs(self: &Arc<Self>) -> AnchorSchedule {
        let anchor = lock(&self.state).anchor;
        let mut tasks = Vec::new();
        let mut syncs = Vec::new();

        if let Some(anchor) = anchor {
            let at_now = now();
            for (config, _) in self.zones.zones() {
                if !config.enabled {
                    continue;
                }
                let offset = TimeDelta::minutes(i64::from(config.sunrise_offset_minutes));
                let Some(at) = anchor.checked_add_signed(offset) else {
                    tracing::debug!(zone = %config.id, %anchor, "sunrise sync time out of range");
                    continue;
                };
                let delay = seconds_until(at, at_now);
                if delay == 0 {
                    tracing::debug!(zone = %config.id, %at, "sunrise sync time already passed");
                    continue;
                }
                let weak = Arc::downgrade(self);
                let zone = config.id.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                    let Some(this) = weak.upgrade() else {
                        return;
                    };
                    tracing::info!(zone = %zone, "running sunrise sync");
                    if let Err(err) = this.force_sync(Some(&zone)).await {
                        tracing::warn!(zone = %zone, error_code = %err.code(), "sunrise sync skipped");
                    }
                });
                tasks.push(handle.abort_handle());
                syncs.push(ScheduledSync {
                    zone: config.id,
                    at,
                });
            }
        }

        let previous = std::mem::replace(&mut lock(&self.tasks).anchor, tasks);
        for handle in previous {
            handle.abort();
        }
        tracing::info!(?anchor, scheduled = syncs.len(), "sunrise syncs scheduled");
        AnchorSchedule { anchor, syncs }
    }

    /// Re-arm sunrise syncs from the stored anchor.
    ///
    /// # Errors
    ///
    /// [`CommandError::SonosDisabled`] when the anchor integration is off.
    pub fn refresh_anchor(self: &Arc<Self>) -> Result<AnchorSchedule, LumenError> {
        let _beat = self.watchdog.heartbeat("command:refresh_anchor");
        if !self.settings.anchor_enabled {
            return Err(CommandError::SonosDisabled.into());
        }
        Ok(self.schedule_anchor_syncs())
    }
}
