use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::error::CoreError;

/// Converts a `CoreError` into the `(bool, message)` response shape the
/// RPC surface specifies, logging the underlying error before replying.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody {
    ok: bool,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Core(_) => {
                tracing::error!(error = %self, "core error serving rpc call");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::BadRequest(_) => {
                tracing::warn!(error = %self, "bad rpc request");
                StatusCode::BAD_REQUEST
            }
        };
        let body = ErrorBody {
            ok: false,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
