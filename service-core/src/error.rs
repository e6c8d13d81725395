use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy shared by the policy enforcement point services.
///
/// Every failure is translated into one of these kinds at the
/// orchestration boundary; the transport mapping lives entirely in the
/// `IntoResponse` impl below.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    /// Tampered, forged or malformed signed policy token.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Identity/registry system unreachable or timed out. Surfaced as
    /// not-found: the caller cannot distinguish "unknown" from
    /// "unreachable" without extra detail.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(anyhow::Error),

    /// Identity/registry system answered with a non-success status,
    /// surfaced verbatim.
    #[error("Upstream rejected the request with status {status}")]
    UpstreamRejected { status: u16, detail: String },

    /// Persistence layer failure. Full detail is logged, never leaked.
    #[error("Store failure: {0}")]
    StoreFailure(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let (status, error_message, details) = match self {
            AppError::ValidationError(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error".to_string(),
                Some(err.to_string()),
            ),
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string(), None),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None),
            AppError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err.to_string(), None),
            AppError::InvalidSignature => {
                (StatusCode::UNAUTHORIZED, "invalid jws".to_string(), None)
            }
            AppError::UpstreamUnavailable(err) => {
                tracing::error!(error = %err, "upstream unreachable");
                (
                    StatusCode::NOT_FOUND,
                    "Can't contact identity registry".to_string(),
                    None,
                )
            }
            AppError::UpstreamRejected { status, detail } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                "Identity registry rejected the request".to_string(),
                Some(detail),
            ),
            AppError::StoreFailure(err) => {
                tracing::error!(error = %err, "store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong handling the data".to_string(),
                    None,
                )
            }
            AppError::InternalError(err) => {
                tracing::error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            AppError::ConfigError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                Some(err.to_string()),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
            }),
        )
            .into_response()
    }
}
