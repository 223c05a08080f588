use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::policy::EntityKind;

pub type AppResult<T> = Result<T, AppError>;

/// RepoError
///
/// Failures raised by the storage layer.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness rule was violated (duplicate username).
    #[error("conflict: {0}")]
    Conflict(String),
}

/// AppError
///
/// Handler-boundary taxonomy. Every failure a request can hit ends up here and is
/// translated into a response; nothing escapes as an unhandled fault.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: i64 },

    /// No route, or an unsupported format suffix.
    #[error("no resource at {0}")]
    NoRoute(String),

    /// A write was attempted without a session. Denied like any other write the
    /// caller may not make; the HTML pages redirect to `/login` instead.
    #[error("authentication credentials were not provided")]
    LoginRequired,

    /// The session identity does not own the record.
    #[error("you do not have permission to perform this action")]
    PermissionDenied,

    #[error("validation failed: {0}")]
    Validation(String),

    /// Bad credentials. Deliberately silent about which half was wrong.
    #[error("invalid username or password")]
    Authentication,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(entity: EntityKind, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } | AppError::NoRoute(_) => StatusCode::NOT_FOUND,
            AppError::LoginRequired | AppError::PermissionDenied => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Authentication => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } | AppError::NoRoute(_) => "NOT_FOUND",
            AppError::LoginRequired | AppError::PermissionDenied => "PERMISSION_DENIED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Authentication => "AUTHENTICATION_FAILED",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to a client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(detail) => {
                tracing::error!("internal error: {}", detail);
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// ErrorResponse
///
/// JSON body of every failed API request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.public_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Conflict(msg) => AppError::Conflict(msg),
            RepoError::Database(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::Internal(format!("session token: {err}"))
    }
}

impl From<askama::Error> for AppError {
    fn from(err: askama::Error) -> Self {
        AppError::Internal(format!("template: {err}"))
    }
}
