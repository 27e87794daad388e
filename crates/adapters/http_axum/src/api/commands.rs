//! Global commands.

use std::str::FromStr;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use lumen_app::orchestrator::{
    AdjustReport, AnchorSchedule, ModeChange, PreferencesBackup, SceneChange, SyncReport,
};
use lumen_app::ports::{LightController, SnapshotStore};
use lumen_domain::id::ZoneId;
use lumen_domain::mode::Mode;
use lumen_domain::scene::Scene;

use super::{ApiResult, ok};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub zone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct SceneRequest {
    pub scene: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdjustRequest {
    #[serde(default)]
    pub brightness_step: Option<i32>,
    #[serde(default)]
    pub color_temp_step: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct PauseState {
    pub paused: bool,
    pub changed: bool,
}

/// `POST /api/sync`; the body is optional.
pub async fn sync<C, S>(
    State(state): State<AppState<C, S>>,
    req: Option<Json<SyncRequest>>,
) -> ApiResult<SyncReport>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    let zone = req
        .and_then(|Json(req)| req.zone)
        .map(ZoneId::new)
        .transpose()?;
    let report = state.orchestrator.force_sync(zone.as_ref()).await?;
    ok(report)
}

/// `POST /api/mode`
pub async fn select_mode<C, S>(
    State(state): State<AppState<C, S>>,
    Json(req): Json<ModeRequest>,
) -> ApiResult<ModeChange>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    let mode = Mode::from_str(&req.mode)?;
    ok(state.orchestrator.select_mode(mode).await?)
}

/// `POST /api/scene`
pub async fn select_scene<C, S>(
    State(state): State<AppState<C, S>>,
    Json(req): Json<SceneRequest>,
) -> ApiResult<SceneChange>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    let scene = Scene::from_str(&req.scene)?;
    ok(state.orchestrator.select_scene(scene).await?)
}

/// `POST /api/adjust`
pub async fn adjust<C, S>(
    State(state): State<AppState<C, S>>,
    Json(req): Json<AdjustRequest>,
) -> ApiResult<AdjustReport>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    let report = state
        .orchestrator
        .adjust(req.brightness_step, req.color_temp_step)
        .await?;
    ok(report)
}

/// `POST /api/preferences/backup`
pub async fn backup<C, S>(State(state): State<AppState<C, S>>) -> ApiResult<PreferencesBackup>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    ok(state.orchestrator.backup_preferences())
}

/// `POST /api/preferences/restore`
pub async fn restore<C, S>(State(state): State<AppState<C, S>>) -> ApiResult<PreferencesBackup>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    ok(state.orchestrator.restore_preferences().await?)
}

/// `POST /api/pause`
pub async fn pause<C, S>(State(state): State<AppState<C, S>>) -> ApiResult<PauseState>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    let changed = state.orchestrator.pause();
    ok(PauseState {
        paused: true,
        changed,
    })
}

/// `POST /api/resume`
pub async fn resume<C, S>(State(state): State<AppState<C, S>>) -> ApiResult<PauseState>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    let changed = state.orchestrator.resume().await;
    ok(PauseState {
        paused: false,
        changed,
    })
}

/// `POST /api/anchor/refresh`
pub async fn refresh_anchor<C, S>(State(state): State<AppState<C, S>>) -> ApiResult<AnchorSchedule>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    ok(state.orchestrator.refresh_anchor()?)
}
