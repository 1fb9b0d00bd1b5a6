use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use pulse_compute::{PipelineError, PipelineOutcome};

use crate::state::AppState;

use super::{api_error, ApiError};

/// Run one detection pass over the whole store and deliver alerts.
pub async fn alerts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PipelineOutcome>, ApiError> {
    state.pipeline.run().await.map(Json).map_err(|e| {
        let status = match &e {
            PipelineError::StoreRead(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Schema(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Detector(_) | PipelineError::Alerting(_) | PipelineError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        api_error(status, e.to_string())
    })
}
