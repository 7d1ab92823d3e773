use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Schedule conflict: {0}")]
    Conflict(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    #[error("Registration closed: {0}")]
    Deadline(String),

    #[error("Duplicate registration: {0}")]
    DuplicateRegistration(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Identity mismatch: {0}")]
    IdentityMismatch(String),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::Capacity(_) => StatusCode::CONFLICT,
            AppError::Deadline(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateRegistration(_) => StatusCode::CONFLICT,
            AppError::Duplicate(_) => StatusCode::CONFLICT,
            AppError::IdentityMismatch(_) => StatusCode::FORBIDDEN,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "SCHEDULE_CONFLICT",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::Capacity(_) => "CAPACITY_EXCEEDED",
            AppError::Deadline(_) => "REGISTRATION_CLOSED",
            AppError::DuplicateRegistration(_) => "DUPLICATE_REGISTRATION",
            AppError::Duplicate(_) => "DUPLICATE",
            AppError::IdentityMismatch(_) => "IDENTITY_MISMATCH",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Message that is safe to hand back to a client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::InvalidTransition(msg)
            | AppError::Capacity(msg)
            | AppError::Deadline(msg)
            | AppError::DuplicateRegistration(msg)
            | AppError::Duplicate(msg)
            | AppError::IdentityMismatch(msg)
            | AppError::ExternalServiceError(msg) => msg.clone(),
        }
    }

    fn log(&self) {
        match self {
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
            AppError::ExternalServiceError(msg) | AppError::InternalServerError(msg) => {
                error!(code = self.code(), message = %msg, "Application error");
            }
            _ => {
                warn!(code = self.code(), message = %self.public_message(), "Request refused");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Do not expose internal details in the API response
        let details = None;

        error_response(code, self.public_message(), details, status)
    }
}
