use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::testpad::error::TestpadError;

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error(transparent)]
    Testpad(#[from] TestpadError),

    #[error("A test round is already running")]
    RoundAlreadyRunning,

    #[error("No test round is running")]
    RoundNotRunning,

    #[error("{0}")]
    Validation(String),
}

impl DashboardError {
    pub fn kind(&self) -> &'static str {
        match self {
            DashboardError::Testpad(e) => e.kind(),
            DashboardError::RoundAlreadyRunning => "round_already_running",
            DashboardError::RoundNotRunning => "round_not_running",
            DashboardError::Validation(_) => "validation_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            DashboardError::Testpad(e) => match e {
                TestpadError::Unauthenticated => StatusCode::UNAUTHORIZED,
                TestpadError::InvalidCredential => StatusCode::UNAUTHORIZED,
                TestpadError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                TestpadError::Api { .. } => StatusCode::BAD_GATEWAY,
                TestpadError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
                TestpadError::DuplicationFailed(_) => StatusCode::BAD_GATEWAY,
                TestpadError::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
                TestpadError::Validation(_) => StatusCode::BAD_REQUEST,
            },
            DashboardError::RoundAlreadyRunning => StatusCode::CONFLICT,
            DashboardError::RoundNotRunning => StatusCode::CONFLICT,
            DashboardError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        if let DashboardError::Testpad(TestpadError::RateLimited { retry_after_secs }) = &self {
            body["retry_after"] = serde_json::json!(retry_after_secs);
        }

        (self.status(), axum::Json(body)).into_response()
    }
}
