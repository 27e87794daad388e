//! Per-zone commands.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use lumen_app::ports::{LightController, SnapshotStore};
use lumen_domain::id::ZoneId;
use lumen_domain::zone::ZoneConfig;

use super::{ApiResult, ok};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ZoneChange {
    pub zone: ZoneId,
    pub changed: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct BoostRequest {
    #[serde(default)]
    pub environmental: Option<bool>,
    #[serde(default)]
    pub sunset: Option<bool>,
}

/// `POST /api/zones/{zone}/reset`; `changed` tells whether it was manual.
pub async fn reset<C, S>(
    State(state): State<AppState<C, S>>,
    Path(zone): Path<String>,
) -> ApiResult<ZoneChange>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    let zone = ZoneId::new(zone)?;
    let changed = state.orchestrator.reset_zone(&zone).await?;
    ok(ZoneChange { zone, changed })
}

/// `POST /api/zones/{zone}/enable`
pub async fn enable<C, S>(
    State(state): State<AppState<C, S>>,
    Path(zone): Path<String>,
) -> ApiResult<ZoneChange>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    let zone = ZoneId::new(zone)?;
    let changed = state.orchestrator.enable_zone(&zone).await?;
    ok(ZoneChange { zone, changed })
}

/// `POST /api/zones/{zone}/disable`
pub async fn disable<C, S>(
    State(state): State<AppState<C, S>>,
    Path(zone): Path<String>,
) -> ApiResult<ZoneChange>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    let zone = ZoneId::new(zone)?;
    let changed = state.orchestrator.disable_zone(&zone).await?;
    ok(ZoneChange { zone, changed })
}

/// `POST /api/zones/{zone}/boost`
pub async fn boost<C, S>(
    State(state): State<AppState<C, S>>,
    Path(zone): Path<String>,
    Json(req): Json<BoostRequest>,
) -> ApiResult<ZoneConfig>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    let zone = ZoneId::new(zone)?;
    let config = state
        .orchestrator
        .set_zone_boost(&zone, req.environmental, req.sunset)
        .await?;
    ok(config)
}
