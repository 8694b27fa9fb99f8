//! Response bodies of the control surface
//!
//! - `POST|GET /start` returns [`StartResponse`]
//! - `POST|GET /stopDatafile` returns [`StopOutcome`](crate::worker::StopOutcome)
//! - `GET /status` returns [`StatusReport`](crate::worker::StatusReport)
//! - `GET /heartbeat` returns plain text

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub started: bool,
    pub message: &'static str,
}
