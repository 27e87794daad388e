//! Read-only runtime views.

use axum::extract::State;

use lumen_app::health::HealthReport;
use lumen_app::orchestrator::RuntimeStatus;
use lumen_app::ports::{LightController, SnapshotStore};

use super::{ApiResult, ok};
use crate::state::AppState;

/// `GET /api/status`
pub async fn status<C, S>(State(state): State<AppState<C, S>>) -> ApiResult<RuntimeStatus>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    ok(state.orchestrator.status())
}

/// `GET /api/health`
pub async fn health<C, S>(State(state): State<AppState<C, S>>) -> ApiResult<HealthReport>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    ok(state.orchestrator.health())
}
