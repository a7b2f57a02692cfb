//! Error types for Bookshelf server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::repository::GatewayError;

/// Application error codes carried in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    StorageFailure = 3,
    NoSuchUser = 4,
    NoSuchBook = 5,
    BookNotAvailable = 7,
    Duplicate = 8,
    BadValue = 18,
    NoSuchData = 20,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {1}")]
    NotFound(NotFoundKind, String),

    /// The book is already on loan
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// Transient persistence failure. Nothing was applied (or the outcome is
    /// unconfirmed); callers may retry.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Which kind of record a `NotFound` refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    User,
    Book,
    Loan,
    Other,
}

impl AppError {
    pub fn user_not_found(id: i32) -> Self {
        AppError::NotFound(NotFoundKind::User, format!("User with id {} not found", id))
    }

    pub fn book_not_found(id: i32) -> Self {
        AppError::NotFound(NotFoundKind::Book, format!("Book with id {} not found", id))
    }

    pub fn open_loan_not_found(user_id: i32, book_id: i32) -> Self {
        AppError::NotFound(
            NotFoundKind::Loan,
            format!("No open loan of book {} for user {}", book_id, user_id),
        )
    }

    /// Whether a caller may safely retry the operation that produced this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Storage(_))
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::PreconditionFailed(msg) => AppError::Conflict(msg),
            GatewayError::Duplicate(msg) => AppError::Duplicate(msg),
            GatewayError::MissingReference(msg) => AppError::NotFound(NotFoundKind::Other, msg),
            GatewayError::Unavailable(msg) => AppError::Storage(msg),
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::NotFound(kind, msg) => {
                let code = match kind {
                    NotFoundKind::User => ErrorCode::NoSuchUser,
                    NotFoundKind::Book => ErrorCode::NoSuchBook,
                    NotFoundKind::Loan | NotFoundKind::Other => ErrorCode::NoSuchData,
                };
                (StatusCode::NOT_FOUND, code, msg.clone())
            }
            AppError::Conflict(msg) => {
                (StatusCode::CONFLICT, ErrorCode::BookNotAvailable, msg.clone())
            }
            AppError::Duplicate(msg) => {
                (StatusCode::CONFLICT, ErrorCode::Duplicate, msg.clone())
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorCode::StorageFailure,
                    "Storage temporarily unavailable, retry later".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AppError::user_not_found(1), StatusCode::NOT_FOUND),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
            (AppError::Duplicate("x".into()), StatusCode::CONFLICT),
            (AppError::Storage("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_gateway_error_conversion() {
        assert!(matches!(
            AppError::from(GatewayError::Unavailable("down".into())),
            AppError::Storage(_)
        ));
        assert!(matches!(
            AppError::from(GatewayError::Duplicate("email".into())),
            AppError::Duplicate(_)
        ));
        assert!(matches!(
            AppError::from(GatewayError::MissingReference("book 3".into())),
            AppError::NotFound(..)
        ));
        assert!(AppError::Storage("x".into()).is_retryable());
        assert!(!AppError::Conflict("x".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_error_body_codes() {
        let cases = [
            (AppError::Validation("x".into()), 18, "BadValue"),
            (AppError::user_not_found(1), 4, "NoSuchUser"),
            (AppError::book_not_found(1), 5, "NoSuchBook"),
            (AppError::open_loan_not_found(1, 1), 20, "NoSuchData"),
            (AppError::Conflict("x".into()), 7, "BookNotAvailable"),
            (AppError::Duplicate("x".into()), 8, "Duplicate"),
            (AppError::Storage("x".into()), 3, "StorageFailure"),
            (AppError::Internal("x".into()), 1, "Failure"),
        ];
        for (err, code, name) in cases {
            let bytes = axum::body::to_bytes(err.into_response().into_body(), usize::MAX)
                .await
                .unwrap();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["code"], code);
            assert_eq!(body["error"], name);
        }
    }
}
