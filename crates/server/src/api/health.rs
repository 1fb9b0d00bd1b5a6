use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub profile: String,
    pub alert_channel: String,
    pub min_observations: usize,
    /// Effective configuration with credentials left out.
    pub config: serde_json::Value,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        profile: state.config.profile_label().to_string(),
        alert_channel: state.pipeline.channel_name().to_string(),
        min_observations: state.pipeline.min_observations(),
        config: state.config.redacted_summary(),
    })
}
