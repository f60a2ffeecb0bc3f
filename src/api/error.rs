use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::RivaultError;

/// Thin wrapper so `RivaultError` can be returned directly from a handler;
/// the mapping here is the dispatcher's status-code taxonomy (see the
/// error handling design: every variant maps to exactly one HTTP status).
pub struct ApiError(pub RivaultError);

impl From<RivaultError> for ApiError {
    fn from(err: RivaultError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RivaultError::NotFound(_) => StatusCode::NOT_FOUND,
            RivaultError::NameConflict(_) => StatusCode::CONFLICT,
            RivaultError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            RivaultError::Cycle(_) => StatusCode::BAD_REQUEST,
            RivaultError::Forbidden(_) => StatusCode::FORBIDDEN,
            RivaultError::QuotaExceeded { .. } => StatusCode::BAD_REQUEST,
            RivaultError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            RivaultError::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RivaultError::Blob(_) => StatusCode::BAD_GATEWAY,
            RivaultError::BlobNotFound(_) => StatusCode::GONE,
            RivaultError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RivaultError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RivaultError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(target: "rivault::http", status = %status, "{}", self.0);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
