//! Error handling module
//!
//! Centralized error type returned across the message bus.

use crate::bus::WiringError;
use crate::config::ConfigError;
use crate::domain::DomainError;
use crate::services::HashError;
use crate::uow::PersistenceError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Domain errors propagate unchanged to the bus caller
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to send SMS message")]
    SmsSendFailed(String),

    // Programmer misuse
    #[error("An operation was attempted outside of an active unit of work")]
    UnitOfWorkContext,

    #[error("No handler registered for {0}")]
    HandlerNotRegistered(&'static str),

    #[error(transparent)]
    Wiring(#[from] WiringError),

    // Server errors; the cause is only logged
    #[error("An unexpected internal error occurred")]
    Internal { cause: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AppError {
    /// Create an internal error, logging its cause
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        let cause = cause.to_string();
        tracing::error!(cause = %cause, "Internal error");
        AppError::Internal { cause }
    }

    /// Stable machine-readable code for the request layer
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Domain(err) => match err {
                DomainError::NotFound(_) => "not_found",
                DomainError::Conflict(_) => "conflict",
                DomainError::AccessDenied => "access_denied",
                DomainError::AttemptLimitReached => "attempt_limit_reached",
                DomainError::InvalidTransition { .. } => "invalid_transition",
            },
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::SmsSendFailed(_) => "sms_send_failed",
            AppError::UnitOfWorkContext => "unit_of_work_context",
            AppError::HandlerNotRegistered(_) => "handler_not_registered",
            AppError::Wiring(_) => "wiring_error",
            AppError::Internal { .. } => "internal_error",
            AppError::Config(_) => "config_error",
        }
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        match self {
            AppError::Domain(err) => err.is_client_error() || err.is_conflict_error(),
            AppError::InvalidRequest(_) => true,
            _ => false,
        }
    }

    /// The domain error, if this is one
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            AppError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PersistenceError> for AppError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::UniqueViolation(what) => {
                AppError::Domain(DomainError::Conflict(what))
            }
            other => AppError::internal(other),
        }
    }
}

impl From<HashError> for AppError {
    fn from(err: HashError) -> Self {
        match err {
            HashError::EmptyInput => AppError::InvalidRequest(err.to_string()),
            HashError::Backend(_) => AppError::internal(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_hides_cause() {
        let err = AppError::internal("connection reset by peer");

        assert_eq!(err.to_string(), "An unexpected internal error occurred");
        match err {
            AppError::Internal { cause } => assert_eq!(cause, "connection reset by peer"),
            other => panic!("Expected Internal, got: {:?}", other),
        }
    }

    #[test]
    fn test_unique_violation_becomes_conflict() {
        let err: AppError = PersistenceError::UniqueViolation("users.phone".to_string()).into();

        assert_eq!(err.error_code(), "conflict");
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::Conflict(what)) if what == "users.phone"
        ));
    }

    #[test]
    fn test_backend_failure_becomes_internal() {
        let err: AppError = PersistenceError::Backend("disk full".to_string()).into();

        assert_eq!(err.error_code(), "internal_error");
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_access_denied_and_attempt_limit_are_distinct() {
        let denied = AppError::from(DomainError::AccessDenied);
        let limited = AppError::from(DomainError::AttemptLimitReached);

        assert_ne!(denied.error_code(), limited.error_code());
        assert!(denied.is_client_error());
        assert!(limited.is_client_error());
    }

    #[test]
    fn test_empty_hash_input_is_invalid_request() {
        let err: AppError = HashError::EmptyInput.into();
        assert_eq!(err.error_code(), "invalid_request");
    }
}
