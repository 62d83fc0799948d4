//! Error types for Pressroom services
//!
//! Provides a single error enum for the edition lifecycle with:
//! - Distinct variants for validation, upload-shape and storage failures
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    InvalidDate,
    PayloadTooLarge,

    // Upload shape errors (2xxx)
    MissingPdf,
    TooManyPdfs,

    // Resource errors (4xxx)
    EditionNotFound,

    // Conflict errors (5xxx)
    Conflict,

    // Storage errors (7xxx)
    StorageFault,
    ConnectionError,
    FileSystemError,

    // Internal errors (9xxx)
    InternalError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::InvalidDate => 1003,
            ErrorCode::PayloadTooLarge => 1004,

            ErrorCode::MissingPdf => 2001,
            ErrorCode::TooManyPdfs => 2002,

            ErrorCode::EditionNotFound => 4002,

            ErrorCode::Conflict => 5001,

            ErrorCode::StorageFault => 7001,
            ErrorCode::ConnectionError => 7002,
            ErrorCode::FileSystemError => 7003,

            ErrorCode::InternalError => 9001,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid date: {value}")]
    InvalidDate { value: String },

    #[error("Upload exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    // Upload shape errors
    #[error("A PDF file is required")]
    MissingPdf,

    #[error("Only one PDF file is allowed, got {count}")]
    TooManyPdfs { count: usize },

    // Resource errors
    #[error("Edition not found: {id}")]
    EditionNotFound { id: String },

    // Conflict errors
    #[error("Edition {id} was modified concurrently (expected version {expected})")]
    Conflict { id: String, expected: i64 },

    // Storage errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    // Internal errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a validation failure on a named field
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidDate { .. } => ErrorCode::InvalidDate,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::MissingPdf => ErrorCode::MissingPdf,
            AppError::TooManyPdfs { .. } => ErrorCode::TooManyPdfs,
            AppError::EditionNotFound { .. } => ErrorCode::EditionNotFound,
            AppError::Conflict { .. } => ErrorCode::Conflict,
            AppError::Database(_) => ErrorCode::StorageFault,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Storage { .. } => ErrorCode::FileSystemError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::InvalidDate { .. }
            | AppError::MissingPdf
            | AppError::TooManyPdfs { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::EditionNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict { .. } => StatusCode::CONFLICT,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::Storage { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 503 Service Unavailable
            AppError::DatabaseConnection { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match self {
            AppError::Validation { field, .. } => field,
            AppError::MissingField { field } => Some(field),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::EditionNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::EditionNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_upload_shape_errors_are_client_errors() {
        for err in [AppError::MissingPdf, AppError::TooManyPdfs { count: 2 }] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
            assert!(err.is_client_error());
        }
        assert_eq!(AppError::TooManyPdfs { count: 2 }.code().as_code(), 2002);
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let err = AppError::Conflict {
            id: "abc".into(),
            expected: 3,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[test]
    fn test_io_error_is_server_error() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope").into();
        assert_eq!(err.code(), ErrorCode::FileSystemError);
        assert!(err.is_server_error());
    }

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::TooManyPdfs).unwrap();
        assert_eq!(json, "\"TOO_MANY_PDFS\"");
    }

    #[test]
    fn test_catch_all_is_internal_error() {
        let err: AppError = anyhow::anyhow!("boom").into();
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert_eq!(err.code().as_code(), 9001);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
