//! Shared application state for axum handlers.

use std::sync::Arc;

use tokio::sync::broadcast;

use lumen_app::orchestrator::Orchestrator;
use lumen_app::ports::{LightController, SnapshotStore};
use lumen_domain::event::{CalculationReport, Event, EventKind};

/// Buffered calculation reports per SSE client before it starts lagging.
const STREAM_CAPACITY: usize = 64;

/// Application state shared across all axum handlers.
///
/// Generic over the controller and snapshot store to avoid dynamic dispatch.
/// `Clone` is implemented manually so the underlying types themselves do not
/// need to be `Clone`; only the `Arc` wrapper and the sender are cloned.
pub struct AppState<C, S> {
    pub orchestrator: Arc<Orchestrator<C, S>>,
    /// Fan-out of `CalculationCompleted` events to SSE clients.
    pub calculations: broadcast::Sender<CalculationReport>,
}

impl<C, S> Clone for AppState<C, S> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            calculations: self.calculations.clone(),
        }
    }
}

impl<C, S> AppState<C, S>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    /// Wrap the orchestrator and forward its calculation reports to SSE
    /// clients for as long as the bus lives.
    pub fn new(orchestrator: Arc<Orchestrator<C, S>>) -> Self {
        let (calculations, _) = broadcast::channel(STREAM_CAPACITY);
        let sender = calculations.clone();
        orchestrator
            .bus()
            .subscribe_sync(EventKind::CalculationCompleted, move |event| {
                if let Event::CalculationCompleted(report) = event {
                    // no receiver means no client is listening
                    let _ = sender.send(report.clone());
                }
            });
        Self {
            orchestrator,
            calculations,
        }
    }
}
