//! Gateway error taxonomy and its HTTP mapping.

use crate::platform::PlatformError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("x-user-id header required")]
    MissingTenant,

    #[error("invalid x-user-id: {0}")]
    InvalidTenant(String),

    #[error("{0}")]
    BadRequest(String),

    /// Credentials missing or malformed. Not retried.
    #[error("{0}")]
    Configuration(String),

    /// Session exists but is not logged in.
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Stats not available (Not Admin or too small?): {0}")]
    StatsUnavailable(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn unauthorized() -> Self {
        Self::Unauthorized("Userbot not authorized".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingTenant
            | Self::InvalidTenant(_)
            | Self::BadRequest(_)
            | Self::Configuration(_)
            | Self::StatsUnavailable(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Platform(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable kind carried in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingTenant | Self::InvalidTenant(_) | Self::BadRequest(_) => "bad_request",
            Self::Configuration(_) => "configuration",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::StatsUnavailable(_) => "stats_unavailable",
            Self::Platform(_) => "platform",
            Self::Internal(_) => "internal",
        }
    }
}

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub detail: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "{self}");
        }
        let body = ErrorResponse {
            error: self.kind(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
