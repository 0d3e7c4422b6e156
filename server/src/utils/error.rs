use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::utils::response::error as error_response;

pub type AppResult<T> = Result<T, AppError>;

const RETRY_AFTER_SECS: &str = "1";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error on '{field}': {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Illegal status transition: {0}")]
    IllegalTransition(String),

    #[error("Capacity exceeded: requested {requested}, remaining {remaining}")]
    CapacityExceeded { requested: i32, remaining: i64 },

    #[error("Store unavailable: {0}")]
    TransientStoreError(String),

    #[error("Database error")]
    DatabaseError(sqlx::Error),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        AppError::InvalidInput {
            field,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::IllegalTransition(_) => StatusCode::CONFLICT,
            AppError::CapacityExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::TransientStoreError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidInput { .. } => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::IllegalTransition(_) => "ILLEGAL_TRANSITION",
            AppError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            AppError::TransientStoreError(_) => "STORE_UNAVAILABLE",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientStoreError(_))
    }

    fn public_message(&self) -> String {
        match self {
            AppError::InvalidInput { message, .. } => message.clone(),
            AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::IllegalTransition(msg) => msg.clone(),
            AppError::CapacityExceeded { .. } => "Event is at capacity".to_string(),
            AppError::TransientStoreError(_) => {
                "The service is temporarily unavailable, please retry".to_string()
            }
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::InvalidInput { field, .. } => Some(json!({ "field": field })),
            AppError::CapacityExceeded {
                requested,
                remaining,
            } => Some(json!({ "requested": requested, "remaining": remaining })),
            _ => None,
        }
    }

    fn log(&self) {
        match self {
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
            AppError::InternalServerError(msg) => {
                error!(message = %msg, "Internal server error");
            }
            AppError::TransientStoreError(msg) => {
                warn!(message = %msg, "Transient store error");
            }
            other => {
                warn!(code = other.code(), error = %other, "Request rejected");
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::TransientStoreError(err.to_string())
            }
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // unique_violation
                Some("23505") => AppError::Conflict(match db.constraint() {
                    Some("users_email_key") => "A user with this email already exists".to_string(),
                    Some("rsvps_active_email_key") | Some("rsvps_active_user_key") => {
                        "You have already RSVP'd for this event".to_string()
                    }
                    _ => "Resource already exists".to_string(),
                }),
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => AppError::TransientStoreError(err.to_string()),
                _ => AppError::DatabaseError(err),
            },
            _ => AppError::DatabaseError(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Only expose high-level message to the client
        let mut response = error_response(code, self.public_message(), self.details(), status);
        if self.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_distinct_per_rsvp_failure() {
        assert_eq!(
            AppError::invalid("email", "bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Conflict("dup".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::CapacityExceeded {
                requested: 2,
                remaining: 1
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::TransientStoreError("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(AppError::invalid("name", "x").code(), "VALIDATION_ERROR");
        assert_eq!(
            AppError::IllegalTransition("x".into()).code(),
            "ILLEGAL_TRANSITION"
        );
        assert_eq!(
            AppError::CapacityExceeded {
                requested: 1,
                remaining: 0
            }
            .code(),
            "CAPACITY_EXCEEDED"
        );
    }

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(AppError::TransientStoreError("x".into()).is_retryable());
        assert!(!AppError::Conflict("x".into()).is_retryable());
        assert!(!AppError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_pool_timeout_maps_to_transient() {
        let err: AppError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, AppError::TransientStoreError(_)));
    }

    #[test]
    fn test_transient_response_suggests_retry() {
        let response = AppError::TransientStoreError("pool".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");

        let response = AppError::NotFound("x".into()).into_response();
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn test_details_name_the_field() {
        let details = AppError::invalid("ticketCount", "must be at least 1")
            .details()
            .expect("details");
        assert_eq!(details["field"], "ticketCount");
    }
}
