//! Error handling for the API.
//!
//! Every failure the scheduler can report is a variant of [`CadenceError`].
//! Prefer adding a variant over forcing an error into `Validation` or a
//! generic server error, and document its status code when doing so.

use async_graphql::ErrorExtensions;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

/// The error enum for all error handling across the API.
///
/// See each variant for its corresponding HTTP status code. GraphQL
/// errors carry the same information in their `code` extension.
#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    /// \[400\] A field of the submitted payload is malformed or out of range.
    ///
    /// Only the first violated field is reported.
    #[error("{message}")]
    Validation { field: String, message: String },
    /// \[400\] A recurring pattern can never produce an occurrence.
    #[error("invalid recurring pattern: {0}")]
    InvalidPattern(String),
    /// \[403\] An RSVP came from someone without an attendance record.
    #[error("user {0} is not on the attendance list for this rehearsal")]
    UnknownMember(Uuid),
    /// \[403\] The current user may not perform the action.
    #[error("access forbidden: {0}")]
    Forbidden(String),
    /// \[404\] A referenced band, rehearsal or user does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// \[401\] The endpoint requires a logged-in user.
    #[error("login required")]
    Unauthenticated,
    /// \[401\] A token was malformed, forged or expired.
    #[error("invalid token: {0}")]
    InvalidToken(&'static str),
    /// \[401\] Login failed.
    #[error("invalid email or password")]
    InvalidCredentials,
    /// \[409\] A unique field is already taken.
    #[error("{0}")]
    Conflict(String),
    /// \[500\] An error occurred while interacting with the database.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// \[500\] Password hashing or verification failed.
    #[error("password hashing error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
    /// \[500\] An email could not be rendered or delivered.
    #[error("failed to send email: {0}")]
    Email(String),
}

/// The return type for all fallible operations.
pub type CadenceResult<T> = Result<T, CadenceError>;

impl CadenceError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        CadenceError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CadenceError::Validation { .. } | CadenceError::InvalidPattern(_) => {
                StatusCode::BAD_REQUEST
            }
            CadenceError::UnknownMember(_) | CadenceError::Forbidden(_) => StatusCode::FORBIDDEN,
            CadenceError::NotFound(_) => StatusCode::NOT_FOUND,
            CadenceError::Unauthenticated
            | CadenceError::InvalidToken(_)
            | CadenceError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            CadenceError::Conflict(_) => StatusCode::CONFLICT,
            CadenceError::Database(_) | CadenceError::Hashing(_) | CadenceError::Email(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CadenceError::Validation { .. } => "VALIDATION_ERROR",
            CadenceError::InvalidPattern(_) => "INVALID_PATTERN",
            CadenceError::UnknownMember(_) => "UNKNOWN_MEMBER",
            CadenceError::Forbidden(_) => "AUTHORIZATION_ERROR",
            CadenceError::NotFound(_) => "NOT_FOUND",
            CadenceError::Unauthenticated => "UNAUTHENTICATED",
            CadenceError::InvalidToken(_) => "INVALID_TOKEN",
            CadenceError::InvalidCredentials => "INVALID_CREDENTIALS",
            CadenceError::Conflict(_) => "CONFLICT",
            CadenceError::Database(_) => "DATABASE_ERROR",
            CadenceError::Hashing(_) => "HASHING_ERROR",
            CadenceError::Email(_) => "EMAIL_ERROR",
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            CadenceError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    fn log_if_internal(&self) {
        if self.status().is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }
    }
}

impl ErrorExtensions for CadenceError {
    fn extend(&self) -> async_graphql::Error {
        self.log_if_internal();

        async_graphql::Error::new(self.to_string()).extend_with(|_, extensions| {
            extensions.set("code", self.code().to_owned());
            if let Some(field) = self.field() {
                extensions.set("field", field.to_owned());
            }
        })
    }
}

impl IntoResponse for CadenceError {
    fn into_response(self) -> Response {
        self.log_if_internal();

        let mut body = json!({
            "message": self.to_string(),
            "code": self.code(),
            "statusCode": self.status().as_u16(),
        });
        if let Some(field) = self.field() {
            body["field"] = json!(field);
        }

        (self.status(), Json(body)).into_response()
    }
}
