//! HTTP router construction.

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::api;
use crate::state::AppState;

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]),
        Err(e) => {
            warn!(origin, error = %e, "invalid CORS_ORIGIN, allowing any origin");
            CorsLayer::permissive()
        }
    }
}

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);
    Router::new()
        .route("/health", get(api::health))
        .route("/pulses", post(api::submit_pulse))
        .route("/pulses/recent", get(api::recent_pulses))
        .route("/pulses/latest", get(api::latest_pulse))
        .route("/sectors/{sector}/summary", get(api::sector_summary))
        .route("/alerts", get(api::alerts))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use pulse_core::{PulseConfig, COLUMNS};
    use pulse_notify::Dispatcher;
    use pulse_store::CsvObservationStore;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    fn app(data_file: &Path) -> Router {
        app_with(data_file, |_| {})
    }

    fn app_with(data_file: &Path, tweak: impl FnOnce(&mut PulseConfig)) -> Router {
        let mut config = PulseConfig::for_profile("ROUTERTEST");
        config.storage.data_file = data_file.to_path_buf();
        config.detection.random_seed = Some(7);
        config.detection.min_observations = 10;
        tweak(&mut config);
        let store = Arc::new(CsvObservationStore::new(data_file));
        let state = AppState::new(config, store, Dispatcher::disabled()).unwrap();
        build_router(Arc::new(state))
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_pulse(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/pulses")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn pulse(region: &str, visitors: u64, queue: f64, crowd: u8) -> Value {
        json!({
            "region": region,
            "sector": "Retail",
            "visitor_count": visitors,
            "top_items": "Rice, Dal",
            "queue_time": queue,
            "payment_modes": ["UPI", "Cash"],
            "crowd_index": crowd,
        })
    }

    #[tokio::test]
    async fn health_reports_disabled_channel() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir.path().join("pulse.csv"));
        let (status, body) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["alert_channel"], "none");
        assert_eq!(body["min_observations"], 10);
    }

    #[tokio::test]
    async fn health_exposes_config_without_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(&dir.path().join("pulse.csv"), |c| {
            c.alerting.smtp_username = Some("relay-user".to_string());
            c.alerting.smtp_password = Some("hunter2".to_string());
        });
        let (status, body) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["config"]["detection"]["random_seed"], 7);
        assert_eq!(body["config"]["alerting"]["configured"], false);
        let rendered = body["config"].to_string();
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("relay-user"));
    }

    #[tokio::test]
    async fn submitted_pulse_shows_up_in_views() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir.path().join("pulse.csv"));

        let (status, body) = send(&app, post_pulse(pulse("Mumbai", 120, 12.5, 6))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["region"], "Mumbai");
        assert_eq!(body["payment_modes"], json!(["UPI", "Cash"]));

        let (status, body) = send(&app, get_req("/pulses/recent?limit=5")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["visitor_count"], "120");

        let (status, body) =
            send(&app, get_req("/pulses/latest?region=Mumbai&sector=Retail")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["crowd_index"], "6");

        let (status, body) = send(&app, get_req("/sectors/Retail/summary")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["observations"], 1);
        assert_eq!(body["visitors_by_region"]["Mumbai"], 120);
    }

    #[tokio::test]
    async fn latest_without_match_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir.path().join("pulse.csv"));
        let (status, body) =
            send(&app, get_req("/pulses/latest?region=Delhi&sector=Finance")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("Delhi"));
    }

    #[tokio::test]
    async fn unknown_sector_summary_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir.path().join("pulse.csv"));
        let (status, _) = send(&app, get_req("/sectors/Mining/summary")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_submission_is_rejected_and_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulse.csv");
        let app = app(&path);

        let (status, body) = send(&app, post_pulse(pulse("Atlantis", 10, 1.0, 2))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("Atlantis"));

        let (status, _) = send(&app, post_pulse(pulse("Delhi", 10, 1.0, 11))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let mut bad_mode = pulse("Delhi", 10, 1.0, 2);
        bad_mode["payment_modes"] = json!(["Barter"]);
        let (status, _) = send(&app, post_pulse(bad_mode)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn alerts_on_small_store_report_insufficient_data() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir.path().join("pulse.csv"));
        send(&app, post_pulse(pulse("Chennai", 30, 4.0, 3))).await;

        let (status, body) = send(&app, get_req("/alerts")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "insufficient_data");
        assert_eq!(body["observed"], 1);
        assert_eq!(body["required"], 10);
    }

    #[tokio::test]
    async fn alerts_flag_the_surge_row() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir.path().join("pulse.csv"));
        for i in 0..9u64 {
            let body = pulse(
                "Mumbai",
                40 + i,
                5.0 + (i % 6) as f64,
                2 + (i % 3) as u8,
            );
            let (status, _) = send(&app, post_pulse(body)).await;
            assert_eq!(status, StatusCode::CREATED);
        }
        send(&app, post_pulse(pulse("Delhi", 45, 90.0, 10))).await;

        let (status, body) = send(&app, get_req("/alerts")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        let report = &body["report"];
        assert_eq!(report["observations"].as_array().unwrap().len(), 10);
        assert_eq!(report["observations"][9]["label"], "anomalous");

        let alerts = report["alerts"].as_array().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["observation_index"], 9);
        assert_eq!(alerts[0]["channel"], "none");
        assert_eq!(alerts[0]["outcome"]["status"], "failed");
    }

    #[tokio::test]
    async fn alerts_on_malformed_store_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulse.csv");
        let mut csv = COLUMNS.join(",");
        csv.push('\n');
        for i in 0..10 {
            let crowd = if i == 4 { "abc".to_string() } else { "3".to_string() };
            csv.push_str(&format!(
                "2025-05-01T09:0{i}:00Z,Delhi,Finance,{},,6,UPI,{crowd}\n",
                20 + i
            ));
        }
        std::fs::write(&path, csv).unwrap();

        let app = app(&path);
        let (status, body) = send(&app, get_req("/alerts")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("crowd_index"));
    }

    #[tokio::test]
    async fn alerts_on_short_stored_row_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulse.csv");
        let mut csv = COLUMNS.join(",");
        csv.push('\n');
        for i in 0..10 {
            let tail = if i == 4 { "" } else { ",3" };
            csv.push_str(&format!(
                "2025-05-01T09:0{i}:00Z,Delhi,Finance,{},,6,UPI{tail}\n",
                20 + i
            ));
        }
        std::fs::write(&path, csv).unwrap();

        let app = app(&path);
        let (status, body) = send(&app, get_req("/alerts")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let error = body["error"].as_str().unwrap();
        assert!(error.contains("row 4"), "got: {error}");
        assert!(error.contains("crowd_index"), "got: {error}");
    }

    #[tokio::test]
    async fn alerts_on_unreadable_store_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the data file should be cannot be read as CSV.
        let app = app(dir.path());
        let (status, _) = send(&app, get_req("/alerts")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = send(&app, get_req("/pulses/recent")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn explicit_origin_builds_restricted_layer() {
        let _ = cors_layer("http://localhost:3000");
        let _ = cors_layer("*");
        let _ = cors_layer("bad\norigin");
    }
}
