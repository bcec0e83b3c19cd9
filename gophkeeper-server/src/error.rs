//! Server error types.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gophkeeper_core::proto::{ErrorBody, ErrorCode};
use gophkeeper_core::SyncError;
use thiserror::Error;

use crate::auth::AuthError;
use crate::storage::StorageError;

/// Server errors mapped to wire codes and HTTP status codes.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("wrong email or password")]
    WrongAuth,

    #[error("missing access token")]
    NoToken,

    #[error("invalid or expired access token")]
    InvalidToken,

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Validation(_) => ErrorCode::Validation,
            Self::WrongAuth => ErrorCode::WrongAuth,
            Self::NoToken => ErrorCode::NoToken,
            Self::InvalidToken => ErrorCode::InvalidToken,
            Self::Sync(SyncError::NoKey) => ErrorCode::SyncNoKey,
            Self::Sync(SyncError::IdentityConflict { .. }) => ErrorCode::SyncIdentityConflict,
            Self::DeadlineExceeded => ErrorCode::DeadlineExceeded,
            Self::Storage(_) | Self::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Validation => StatusCode::BAD_REQUEST,
            ErrorCode::WrongAuth | ErrorCode::NoToken | ErrorCode::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            ErrorCode::SyncNoKey => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::SyncIdentityConflict => StatusCode::CONFLICT,
            ErrorCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let code = self.code();
        let message = match &self {
            Self::Storage(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let body = ErrorBody {
            error: message,
            code,
        };
        (self.status(), axum::Json(body)).into_response()
    }
}

impl From<StorageError> for ServerError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Interrupted => Self::DeadlineExceeded,
            StorageError::NotFound(what) => Self::NotFound(what),
            other => Self::Storage(other),
        }
    }
}

impl From<AuthError> for ServerError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::UserNotFound | AuthError::WrongAuth => Self::WrongAuth,
            AuthError::InvalidToken => Self::InvalidToken,
            AuthError::Crypto(e) => Self::Internal(e.to_string()),
            AuthError::Storage(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(e: JsonRejection) -> Self {
        Self::Validation(e.body_text())
    }
}
