use subtask_core::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

#[cfg(feature = "http")]
impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Engine(EngineError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Engine(EngineError::AdmissionRejected(_)) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Engine(EngineError::ExecutorUnsupported(_))
            | ApiError::Engine(EngineError::ShuttingDown) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
