use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use super::{
    services::{heartbeat, start_datafile, status, stop_datafile},
    state::AppState,
};

/// Control surface routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/start", get(start_datafile).post(start_datafile))
        .route("/stopDatafile", get(stop_datafile).post(stop_datafile))
        .route("/status", get(status))
        .route("/heartbeat", get(heartbeat))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
