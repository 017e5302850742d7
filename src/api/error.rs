//! HTTP error responses.
//!
//! Every error body has the shape `{"detail": "<message>"}`. Internal errors
//! are logged server-side and answered with a generic message.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::auth::AuthError;

/// Error returned by handlers and extractors.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::BadRequest(detail) => Self::new(StatusCode::BAD_REQUEST, detail),
            AuthError::Unauthorized(detail) => Self::new(StatusCode::UNAUTHORIZED, detail),
            // A taken email is reported as a plain bad request.
            AuthError::Conflict(detail) => Self::new(StatusCode::BAD_REQUEST, detail),
            AuthError::Internal(err) => {
                tracing::error!("Request failed: {:#}", err);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(json!({ "detail": self.detail }))).into_response();
        if self.status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
