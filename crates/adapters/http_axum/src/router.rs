//! Axum router assembly.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use lumen_app::ports::{LightController, SnapshotStore};

use crate::state::AppState;

/// Build the top-level axum [`Router`].
///
/// Serves the command surface under `/api` plus a plain `/health` check.
/// Includes a [`TraceLayer`] that logs each HTTP request/response at the
/// `DEBUG` level using the `tracing` ecosystem.
pub fn build<C, S>(state: AppState<C, S>) -> Router
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", crate::api::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use lumen_app::orchestrator::Orchestrator;
    use lumen_app::ports::{ApplyRequest, ControllerError, MemorySnapshotStore};
    use lumen_domain::id::{ControllerId, LightId, ZoneId};
    use lumen_domain::light::LightState;
    use lumen_domain::zone::ZoneConfig;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct StubController;

    impl LightController for StubController {
        async fn apply(&self, _request: ApplyRequest) -> Result<(), ControllerError> {
            Ok(())
        }

        async fn set_manual_control(
            &self,
            _zone: ZoneId,
            _lights: Vec<LightId>,
            _manual: bool,
        ) -> Result<(), ControllerError> {
            Ok(())
        }

        async fn light_state(
            &self,
            _light: LightId,
        ) -> Result<Option<LightState>, ControllerError> {
            Ok(Some(LightState {
                on: true,
                brightness_pct: Some(50),
                color_temp: None,
            }))
        }
    }

    fn test_state() -> AppState<StubController, MemorySnapshotStore> {
        let office = ZoneConfig::new(
            ZoneId::new("office").unwrap(),
            ControllerId::new("switch.office").unwrap(),
        )
        .with_lights([LightId::new("light.desk").unwrap()]);
        let orchestrator = Orchestrator::builder(StubController, MemorySnapshotStore::default())
            .zones(vec![office])
            .build()
            .unwrap();
        orchestrator.start();
        AppState::new(orchestrator)
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn should_return_ok_when_health_check_called() {
        let app = build(test_state());

        let response = send(app, "GET", "/health", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn should_wrap_status_in_envelope_when_requested() {
        let app = build(test_state());

        let response = send(app, "GET", "/api/status", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert!(body.get("error_code").is_none());
        assert!(body["data"].is_object());
    }

    #[tokio::test]
    async fn should_report_health_score_when_nothing_failed() {
        let app = build(test_state());

        let body = json_body(send(app, "GET", "/api/health", None).await).await;

        assert_eq!(body["status"], "ok");
        assert_eq!(body["data"]["score"], 100);
    }

    #[tokio::test]
    async fn should_sync_every_zone_when_body_is_missing() {
        let app = build(test_state());

        let response = send(app, "POST", "/api/sync", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["synced"], 1);
    }

    #[tokio::test]
    async fn should_return_404_when_syncing_unknown_zone() {
        let app = build(test_state());

        let response = send(app, "POST", "/api/sync", Some(json!({"zone": "garage"}))).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error_code"], "UNKNOWN_ZONE");
    }

    #[tokio::test]
    async fn should_return_400_when_mode_is_unknown() {
        let app = build(test_state());

        let response = send(app, "POST", "/api/mode", Some(json!({"mode": "party"}))).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error_code"], "VALIDATION");
    }

    #[tokio::test]
    async fn should_return_409_when_scene_selected_outside_automatic_mode() {
        let state = test_state();

        let response = send(
            build(state.clone()),
            "POST",
            "/api/mode",
            Some(json!({"mode": "focus"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            build(state),
            "POST",
            "/api/scene",
            Some(json!({"scene": "energize"})),
        )
        .await;

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json_body(response).await;
        assert_eq!(body["error_code"], "MODE_BLOCKED");
    }

    #[tokio::test]
    async fn should_return_400_when_adjust_has_no_step() {
        let app = build(test_state());

        let response = send(app, "POST", "/api/adjust", Some(json!({}))).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error_code"], "NO_ADJUSTMENT");
    }

    #[tokio::test]
    async fn should_return_404_when_resetting_unknown_zone() {
        let app = build(test_state());

        let response = send(app, "POST", "/api/zones/garage/reset", None).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn should_return_409_when_restoring_without_backup() {
        let app = build(test_state());

        let response = send(app, "POST", "/api/preferences/restore", None).await;

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json_body(response).await;
        assert_eq!(body["error_code"], "NO_BACKUP");
    }

    #[tokio::test]
    async fn should_accept_inbound_event_when_valid() {
        let app = build(test_state());

        let response = send(
            app,
            "POST",
            "/api/events",
            Some(json!({"type": "manual_detected", "zone": "office"})),
        )
        .await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["data"]["kind"], "manual_detected");
    }

    #[tokio::test]
    async fn should_reject_environmental_event_when_boost_is_negative() {
        let app = build(test_state());

        let response = send(
            app,
            "POST",
            "/api/events",
            Some(json!({"type": "environmental_changed", "boost_active": true, "boost_pct": -5})),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn should_report_pause_transition_when_paused_twice() {
        let state = test_state();

        let first = json_body(send(build(state.clone()), "POST", "/api/pause", None).await).await;
        let second = json_body(send(build(state), "POST", "/api/pause", None).await).await;

        assert_eq!(first["data"]["changed"], true);
        assert_eq!(second["data"]["changed"], false);
    }
}
