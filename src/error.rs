//! Unified API error handling
//!
//! Provides consistent error responses across all endpoints. Database errors
//! are translated here in one place so handlers can simply use `?` on sqlx
//! calls: constraint and cast failures become client errors, everything else
//! becomes an opaque 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Client-facing classification of a Postgres SQLSTATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DbFailure {
    Duplicate,
    MissingReference,
    ConstraintViolated,
    InvalidValue,
}

fn classify_pg_code(code: &str) -> Option<DbFailure> {
    match code {
        "23505" => Some(DbFailure::Duplicate),
        "23503" => Some(DbFailure::MissingReference),
        "23514" | "23502" => Some(DbFailure::ConstraintViolated),
        "22P02" | "22003" | "22001" | "22007" => Some(DbFailure::InvalidValue),
        _ => None,
    }
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(anyhow::anyhow!(msg.into()))
    }

    /// Replace the generic duplicate message with one specific to the caller.
    pub fn on_duplicate(self, msg: impl Into<String>) -> Self {
        match self.db_failure() {
            Some((DbFailure::Duplicate, _)) => Self::Conflict(msg.into()),
            _ => self,
        }
    }

    /// Like `on_duplicate`, but only for a unique violation on `constraint`.
    pub fn on_duplicate_of(self, constraint: &str, msg: impl Into<String>) -> Self {
        if self.is_duplicate_on(constraint) {
            Self::Conflict(msg.into())
        } else {
            self
        }
    }

    pub fn is_duplicate_on(&self, constraint: &str) -> bool {
        matches!(
            self.db_failure(),
            Some((DbFailure::Duplicate, Some(name))) if name == constraint
        )
    }

    fn db_failure(&self) -> Option<(DbFailure, Option<String>)> {
        let Self::Database(sqlx::Error::Database(db_err)) = self else {
            return None;
        };
        let failure = classify_pg_code(db_err.code()?.as_ref())?;
        Some((failure, db_err.constraint().map(str::to_string)))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            Self::Database(_) => match self.db_failure() {
                Some((DbFailure::Duplicate, _)) => StatusCode::CONFLICT,
                Some(_) => StatusCode::BAD_REQUEST,
                None => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Self::BadGateway(_) => "UPSTREAM_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Database(sqlx::Error::RowNotFound) => "NOT_FOUND",
            Self::Database(_) => match self.db_failure() {
                Some((DbFailure::Duplicate, _)) => "DUPLICATE",
                Some((DbFailure::MissingReference, _)) => "INVALID_REFERENCE",
                Some((DbFailure::ConstraintViolated, _)) => "CONSTRAINT_VIOLATION",
                Some((DbFailure::InvalidValue, _)) => "INVALID_VALUE",
                None => "DATABASE_ERROR",
            },
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg)
            | Self::PayloadTooLarge(msg)
            | Self::BadGateway(msg) => msg.clone(),
            Self::Validation { message, .. } => message.clone(),
            Self::Database(sqlx::Error::RowNotFound) => "Resource not found".to_string(),
            Self::Database(_) => match self.db_failure() {
                Some((DbFailure::Duplicate, _)) => "Resource already exists".to_string(),
                Some((DbFailure::MissingReference, _)) => {
                    "Referenced resource does not exist".to_string()
                }
                Some((DbFailure::ConstraintViolated, _)) => {
                    "Value violates a data constraint".to_string()
                }
                Some((DbFailure::InvalidValue, _)) => "Invalid value".to_string(),
                // Don't leak internal error details
                None => "An internal error occurred".to_string(),
            },
            Self::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation { field, .. } => Some(serde_json::json!({ "field": field })),
            _ => match self.db_failure() {
                Some((_, Some(constraint))) => {
                    Some(serde_json::json!({ "constraint": constraint }))
                }
                _ => None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            Self::Internal(e) => {
                tracing::error!(error = ?e, "Internal server error");
            }
            Self::Database(e) if status.is_server_error() => {
                tracing::error!(error = ?e, "Database error");
            }
            _ => {
                tracing::warn!(error = %self, status = %status, "API error");
            }
        }

        let body = ErrorResponse {
            code: self.error_code().to_string(),
            message: self.public_message(),
            details: self.details(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;

    #[derive(Debug)]
    struct UniqueViolation(&'static str);

    impl std::fmt::Display for UniqueViolation {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "duplicate key value violates unique constraint \"{}\"", self.0)
        }
    }

    impl std::error::Error for UniqueViolation {}

    impl DatabaseError for UniqueViolation {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed("23505"))
        }

        fn constraint(&self) -> Option<&str> {
            Some(self.0)
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    fn duplicate_on(constraint: &'static str) -> ApiError {
        ApiError::from(sqlx::Error::Database(Box::new(UniqueViolation(constraint))))
    }

    #[test]
    fn client_errors_keep_their_message() {
        let err = ApiError::bad_request("Project can only be edited while in draft");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "BAD_REQUEST");
        assert_eq!(err.public_message(), "Project can only be edited while in draft");
    }

    #[test]
    fn internal_errors_are_opaque() {
        let err = ApiError::internal("connection refused on 10.0.0.3");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "An internal error occurred");
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let err = ApiError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn unrelated_database_errors_are_500() {
        let err = ApiError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "An internal error occurred");
    }

    #[test]
    fn postgres_codes_are_classified() {
        assert_eq!(classify_pg_code("23505"), Some(DbFailure::Duplicate));
        assert_eq!(classify_pg_code("23503"), Some(DbFailure::MissingReference));
        assert_eq!(classify_pg_code("23514"), Some(DbFailure::ConstraintViolated));
        assert_eq!(classify_pg_code("22P02"), Some(DbFailure::InvalidValue));
        assert_eq!(classify_pg_code("40001"), None);
    }

    #[test]
    fn on_duplicate_leaves_other_errors_alone() {
        let err = ApiError::from(sqlx::Error::RowNotFound).on_duplicate("taken");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn duplicates_are_told_apart_by_constraint() {
        let err = duplicate_on("quotations_number_key");
        assert!(err.is_duplicate_on("quotations_number_key"));
        assert!(!err.is_duplicate_on("quotations_open_per_seller_key"));

        let err = err.on_duplicate_of("quotations_open_per_seller_key", "open quotation exists");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.public_message(), "Resource already exists");
        assert_eq!(
            err.details(),
            Some(serde_json::json!({ "constraint": "quotations_number_key" }))
        );

        let err = duplicate_on("quotations_open_per_seller_key")
            .on_duplicate_of("quotations_open_per_seller_key", "open quotation exists");
        assert_eq!(err.public_message(), "open quotation exists");
        assert!(!ApiError::from(sqlx::Error::RowNotFound).is_duplicate_on("any"));
    }

    #[test]
    fn validation_error_carries_field() {
        let err = ApiError::validation("gstin", "Invalid GSTIN format");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert_eq!(err.details(), Some(serde_json::json!({ "field": "gstin" })));
    }
}
