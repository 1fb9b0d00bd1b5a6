//! Intake and read-only views over the observation store.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use pulse_core::{Observation, PulseRecord, PulseSubmission};
use pulse_store::views::{self, SectorSummary, DEFAULT_RECENT_LIMIT};
use serde::Deserialize;
use tracing::{info, warn};

use crate::state::AppState;

use super::{api_error, ApiError};

fn load_records(state: &AppState) -> Result<Vec<PulseRecord>, ApiError> {
    state.store.read_all().map_err(|e| {
        warn!(error = %e, "store read failed");
        api_error(StatusCode::SERVICE_UNAVAILABLE, format!("observation store unavailable: {e}"))
    })
}

// ── Intake ────────────────────────────────────────────────────────

pub async fn submit_pulse(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<PulseSubmission>,
) -> Result<(StatusCode, Json<Observation>), ApiError> {
    let observation = Observation::new(submission, Utc::now(), &state.config.taxonomy)
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    state.store.append(&observation).map_err(|e| {
        warn!(error = %e, "failed to append observation");
        api_error(StatusCode::SERVICE_UNAVAILABLE, format!("failed to store observation: {e}"))
    })?;

    info!(
        region = observation.region(),
        sector = observation.sector(),
        crowd_index = observation.crowd_index(),
        "pulse recorded"
    );
    Ok((StatusCode::CREATED, Json(observation)))
}

// ── Views ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    pub limit: Option<usize>,
}

pub async fn recent_pulses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<PulseRecord>>, ApiError> {
    let records = load_records(&state)?;
    let limit = params.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    Ok(Json(
        views::recent(&records, limit).into_iter().cloned().collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LatestParams {
    pub region: String,
    pub sector: String,
}

pub async fn latest_pulse(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LatestParams>,
) -> Result<Json<PulseRecord>, ApiError> {
    let records = load_records(&state)?;
    views::latest_for(&records, &params.region, &params.sector)
        .cloned()
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("no pulse recorded for {} / {}", params.region, params.sector),
            )
        })
}

pub async fn sector_summary(
    State(state): State<Arc<AppState>>,
    Path(sector): Path<String>,
) -> Result<Json<SectorSummary>, ApiError> {
    if !state.config.taxonomy.has_sector(&sector) {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("unknown sector: {sector}"),
        ));
    }
    let records = load_records(&state)?;
    Ok(Json(views::sector_summary(&records, &sector)))
}
