use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use super::{error::ApiError, models::StartResponse, state::AppState};

/// Arm a collection cycle (`/start`)
///
/// 201 when a new cycle was started, 406 when one is already running.
pub async fn start_datafile(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    if !state.scheduler.start() {
        return Err(ApiError::AlreadyRunning);
    }
    info!("Collection started via control surface");
    Ok((
        StatusCode::CREATED,
        Json(StartResponse {
            started: true,
            message: "Datafile Service has been started!",
        }),
    ))
}

/// Stop collection and cancel outstanding jobs (`/stopDatafile`); always 200
pub async fn stop_datafile(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = state.scheduler.stop().await;
    (StatusCode::OK, Json(outcome))
}

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.scheduler.status()))
}

pub async fn heartbeat(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, state.scheduler.heartbeat())
}
