//! Inbound events posted by external observers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use lumen_app::ports::{LightController, SnapshotStore};
use lumen_domain::error::ValidationError;
use lumen_domain::event::{Event, EventKind};

use super::Envelope;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub kind: EventKind,
}

/// `POST /api/events`
///
/// Validates the event and publishes it on the bus. Handlers run
/// asynchronously, so `202 Accepted` only acknowledges delivery.
pub async fn inject<C, S>(
    State(state): State<AppState<C, S>>,
    Json(event): Json<Event>,
) -> Result<(StatusCode, Json<Envelope<Accepted>>), ApiError>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    let kind = event.kind();
    if kind == EventKind::CalculationCompleted {
        return Err(ValidationError::NotInjectable(kind.to_string()).into());
    }
    event.validate()?;
    tracing::debug!(%kind, "inbound event accepted");
    state.orchestrator.bus().publish(event);
    Ok((StatusCode::ACCEPTED, Json(Envelope::ok(Accepted { kind }))))
}
