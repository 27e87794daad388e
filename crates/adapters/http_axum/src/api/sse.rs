//! Server-Sent Events (SSE) stream of recomposed adjustments.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use lumen_app::ports::{LightController, SnapshotStore};

use crate::state::AppState;

/// `GET /api/events/stream`
///
/// Sends every `CalculationCompleted` report as a JSON `data:` frame named
/// `calculation_completed`, until the client disconnects.
pub async fn stream<C, S>(
    State(state): State<AppState<C, S>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    let receiver = state.calculations.subscribe();
    let events = BroadcastStream::new(receiver).filter_map(|result| match result {
        Ok(report) => match serde_json::to_string(&report) {
            Ok(json) => Some(Ok(Event::default().event("calculation_completed").data(json))),
            Err(err) => {
                tracing::warn!(%err, "failed to serialize calculation report for SSE stream");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "SSE subscriber lagged, some reports were dropped");
            None
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
