//! JSON command surface.
//!
//! Every handler answers with an [`Envelope`]; failures go through
//! [`ApiError`](crate::error::ApiError) and carry the stable error code.

#[allow(clippy::missing_errors_doc)]
pub mod commands;
#[allow(clippy::missing_errors_doc)]
pub mod events;
pub mod sse;
#[allow(clippy::missing_errors_doc)]
pub mod status;
#[allow(clippy::missing_errors_doc)]
pub mod zones;

use axum::Json;
use axum::Router;
use axum::routing::{get, post};
use serde::Serialize;

use lumen_app::ports::{LightController, SnapshotStore};
use lumen_domain::error::ErrorCode;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    Ok,
    Error,
}

/// Response body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: EnvelopeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: EnvelopeStatus::Ok,
            error_code: None,
            message: None,
            data: Some(data),
        }
    }

    pub fn error(code: ErrorCode, message: String) -> Self {
        Self {
            status: EnvelopeStatus::Error,
            error_code: Some(code),
            message: Some(message),
            data: None,
        }
    }
}

/// Result type of every JSON handler.
pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope::ok(data)))
}

/// Build the `/api` sub-router.
pub fn routes<C, S>() -> Router<AppState<C, S>>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    Router::new()
        // Read side
        .route("/status", get(status::status::<C, S>))
        .route("/health", get(status::health::<C, S>))
        .route("/events/stream", get(sse::stream::<C, S>))
        // Inbound events
        .route("/events", post(events::inject::<C, S>))
        // Commands
        .route("/sync", post(commands::sync::<C, S>))
        .route("/mode", post(commands::select_mode::<C, S>))
        .route("/scene", post(commands::select_scene::<C, S>))
        .route("/adjust", post(commands::adjust::<C, S>))
        .route("/preferences/backup", post(commands::backup::<C, S>))
        .route("/preferences/restore", post(commands::restore::<C, S>))
        .route("/pause", post(commands::pause::<C, S>))
        .route("/resume", post(commands::resume::<C, S>))
        .route("/anchor/refresh", post(commands::refresh_anchor::<C, S>))
        // Zones
        .route("/zones/{zone}/reset", post(zones::reset::<C, S>))
        .route("/zones/{zone}/enable", post(zones::enable::<C, S>))
        .route("/zones/{zone}/disable", post(zones::disable::<C, S>))
        .route("/zones/{zone}/boost", post(zones::boost::<C, S>))
}
