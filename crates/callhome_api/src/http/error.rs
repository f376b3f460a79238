use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::domain::DomainError;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid query parameters: {0}")]
    InvalidQuery(String),

    #[error("invalid limit size: {0}")]
    LimitSize(u64),

    #[error("invalid date range: to is before from")]
    InvalidDateRange,

    #[error("malformed entity: {0}")]
    MalformedEntity(String),

    #[error("unsupported content type")]
    UnsupportedContentType,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidQuery(_)
            | Self::LimitSize(_)
            | Self::InvalidDateRange
            | Self::MalformedEntity(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedContentType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Domain(err) => match err {
                DomainError::ValidationError(_) => StatusCode::BAD_REQUEST,
                _ if err.is_invalid_event() => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if status.is_server_error() {
            error!("request failed: {:#}", anyhow::Error::new(self));
            "internal server error".to_owned()
        } else {
            warn!(status = status.as_u16(), "request rejected: {}", self);
            match &self {
                Self::Domain(err) if err.is_invalid_event() => "invalid event".to_owned(),
                _ => self.to_string(),
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
