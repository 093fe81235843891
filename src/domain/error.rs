//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use super::otp::OtpStatus;

/// Domain-specific errors
///
/// These errors represent business rule violations and domain invariant failures.
/// They are independent of the persistence and transport layers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// The requested resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Uniqueness violation (e.g. phone already registered)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// OTP verification failed.
    ///
    /// Never says which check failed (id, status, origin, expiry or code).
    #[error("Access denied: OTP is invalid or expired")]
    AccessDenied,

    /// Verification attempts or issuance requests exhausted
    #[error("The maximum number of allowed attempts has been reached")]
    AttemptLimitReached,

    /// OTP status may only move one step forward
    #[error("Invalid OTP transition: {from} -> {to}")]
    InvalidTransition { from: OtpStatus, to: OtpStatus },
}

impl DomainError {
    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a conflict error
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict(reason.into())
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::AccessDenied | Self::AttemptLimitReached
        )
    }

    /// Check if this is a conflict error
    pub fn is_conflict_error(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
