use std::any::Any;

use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde_json::json,
    tracing::error,
};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),
}

impl GatewayError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": message })),
            )
                .into_response(),
        }
    }
}

/// Body for unexpected failures. Details stay in the log.
pub fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": "internal error" })),
    )
        .into_response()
}

/// [`tower_http::catch_panic::CatchPanicLayer`] handler.
pub fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    error!("handler panicked");
    internal_error()
}
