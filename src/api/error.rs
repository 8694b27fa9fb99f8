use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use super::models::ErrorResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("datafile collection is already running")]
    AlreadyRunning,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AlreadyRunning => StatusCode::NOT_ACCEPTABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::AlreadyRunning => "ALREADY_RUNNING",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_running_maps_to_not_acceptable() {
        let response = ApiError::AlreadyRunning.into_response();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(ApiError::AlreadyRunning.code(), "ALREADY_RUNNING");
    }
}
