//! Maps `clm_domain::Error` onto the HTTP status codes named in spec.md §7:
//! validation/conflict are 4xx client errors, authorization is 403, not
//! found is 404, anything store/IO/JSON-shaped is a 5xx (subprocess and
//! poller failures never reach here — they're recorded on the `Job` row
//! or logged, never surfaced as a response, per the same section).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use clm_domain::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            Error::Validation(m) => (StatusCode::BAD_REQUEST, m.clone()),
            Error::AuthorizationDenied(m) => (StatusCode::FORBIDDEN, m.clone()),
            Error::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            Error::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            Error::Config(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
            Error::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            Error::Json(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            Error::Store(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
            Error::ExternalApi { service, message } => {
                (StatusCode::BAD_GATEWAY, format!("{service}: {message}"))
            }
            Error::Other(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

pub type ApiResult<T> = Result<T, ApiError>;
