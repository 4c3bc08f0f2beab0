//! HTTP error responses for the web adapter.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::domain::error::TrendgateError;

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

pub fn status_from_error(err: &TrendgateError) -> StatusCode {
    match err {
        TrendgateError::ConfigMissing { .. }
        | TrendgateError::ConfigInvalid { .. }
        | TrendgateError::ConfigParse { .. }
        | TrendgateError::UnknownOverride { .. } => StatusCode::BAD_REQUEST,
        TrendgateError::OverrideInvalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TrendgateError::OutOfOrderBar { .. }
        | TrendgateError::BarGap { .. }
        | TrendgateError::Journal(_) => StatusCode::CONFLICT,
        TrendgateError::NoData { .. } => StatusCode::NOT_FOUND,
        TrendgateError::SchemaMismatch { .. }
        | TrendgateError::Export { .. }
        | TrendgateError::Database { .. }
        | TrendgateError::DatabaseQuery { .. }
        | TrendgateError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<TrendgateError> for WebError {
    fn from(err: TrendgateError) -> Self {
        Self::new(status_from_error(&err), err.to_string())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
            "status": self.status.as_u16(),
        });
        (self.status, Json(body)).into_response()
    }
}
