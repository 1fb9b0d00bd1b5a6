//! JSON API endpoints, one module per page of the dashboard.

mod alerts;
mod health;
mod pulses;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

// ── Shared types ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

// ── Re-exports ───────────────────────────────────────────────────

pub use alerts::alerts;
pub use health::health;
pub use pulses::{latest_pulse, recent_pulses, sector_summary, submit_pulse};
