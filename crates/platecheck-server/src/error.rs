//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use platecheck_scanner::LookupError;
use thiserror::Error;

/// Errors returned by the lookup endpoint, rendered as plain text.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Anything but `POST`
    #[error("Invalid request method")]
    MethodNotAllowed,

    /// Body is not the expected JSON, or the plate is blank
    #[error("Invalid request body")]
    InvalidBody,

    /// The lookup itself failed
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::InvalidBody => StatusCode::BAD_REQUEST,
            Self::Lookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
