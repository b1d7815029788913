//! Application-wide error types and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use onepool_core::{Error as CoreError, PaymentError, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Core(e) => match e {
                CoreError::InvalidAmount(_) | CoreError::InvalidOperation(_) => {
                    StatusCode::BAD_REQUEST
                }
                CoreError::NotVerified(_) | CoreError::NotConnected(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                CoreError::PoolLocked { .. } | CoreError::Conflict { .. } => StatusCode::CONFLICT,
                CoreError::PoolNotFound(_)
                | CoreError::ContributorNotFound { .. }
                | CoreError::BusinessNotFound(_)
                | CoreError::TemplateNotFound(_)
                | CoreError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
                CoreError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CoreError::Payment(PaymentError::Rejected(_) | PaymentError::Transport(_)) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Migrate(_) | Self::Json(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Core(e) => e.code(),
            Self::Database(_) | Self::Migrate(_) => "database_error",
            Self::Http(_) => "http_error",
            Self::Json(_) => "json_error",
            Self::Config(_) => "config_error",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), "Request failed: {self}");
        }
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}
