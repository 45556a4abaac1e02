use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::{envelope::Envelope, users::repo::StoreError};

/// Failure kinds surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("token is invalid or has expired")]
    InvalidOrExpiredToken,

    #[error("delivery failed: {0:#}")]
    Delivery(anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) | AppError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Delivery(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to clients.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(m)
            | AppError::Unauthenticated(m)
            | AppError::InvalidCredentials(m)
            | AppError::Forbidden(m)
            | AppError::NotFound(m)
            | AppError::Conflict(m)
            | AppError::PayloadTooLarge(m) => m.clone(),
            AppError::InvalidOrExpiredToken => "The token has expired or is invalid".into(),
            AppError::Delivery(_) => "There was an error sending the email. Try again later".into(),
            AppError::Internal(_) => "Something went wrong".into(),
        }
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        AppError::Unauthenticated(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => AppError::Conflict("Email already registered".into()),
            StoreError::NotFound => AppError::NotFound("No user found with that ID".into()),
            StoreError::UnknownField(f) => AppError::Validation(format!("Unknown field: {f}")),
            StoreError::UnsupportedOperator(op) => {
                AppError::Validation(format!("Unsupported filter operator: {op}"))
            }
            StoreError::InvalidValue(msg) => AppError::Validation(format!("Invalid value: {msg}")),
            StoreError::Database(e) => AppError::Internal(anyhow::Error::new(e).context("database")),
            StoreError::Corrupt(msg) => AppError::Internal(anyhow::anyhow!("corrupt user row: {msg}")),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::PayloadTooLarge("Request body is too large".into());
        }
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AppError::Internal(_) | AppError::Delivery(_) => {
                tracing::error!(error = ?self, %status, "request failed");
            }
            AppError::Unauthenticated(_) | AppError::InvalidCredentials(_) | AppError::Forbidden(_) => {
                tracing::info!(error = %self, %status, "request rejected");
            }
            _ => tracing::debug!(error = %self, %status, "client error"),
        }

        let body = Envelope::<()>::failure(status, self.user_message());
        (status, Json(body)).into_response()
    }
}
