//! Unit of Work
//!
//! One atomic transaction and the repositories bound to it. Every command
//! handler invocation creates its own unit from the injected factory, so
//! concurrent requests never share a session.
//!
//! Lifecycle: `begin()` allocates the session, `commit()` persists every
//! mutation at once, and dropping an uncommitted unit discards its changes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{DomainError, Otp, OtpStatus, User};
use crate::error::{AppError, AppResult};

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryStore, InMemoryUnitOfWork};
pub use postgres::{PgUnitOfWork, PgUnitOfWorkFactory};

/// Repository failures
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unique constraint").to_string();
                return PersistenceError::UniqueViolation(constraint);
            }
        }
        PersistenceError::Database(err)
    }
}

/// Row-lock filter. An OTP is returned only when all three match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpLock<'a> {
    pub id: u64,
    pub status: OtpStatus,
    pub ipaddr: &'a str,
}

#[async_trait]
pub trait OtpRepo: Send {
    async fn get(&mut self, id: u64) -> Result<Option<Otp>, PersistenceError>;

    /// Load and lock the OTP until the transaction ends
    async fn get_for_update(&mut self, lock: OtpLock<'_>) -> Result<Option<Otp>, PersistenceError>;

    async fn add(&mut self, otp: &Otp) -> Result<(), PersistenceError>;

    async fn update(&mut self, otp: &Otp) -> Result<(), PersistenceError>;

    /// OTPs created since `since` for the phone or for the origin
    async fn count_issued_since(
        &mut self,
        phone: &str,
        ipaddr: &str,
        since: DateTime<Utc>,
    ) -> Result<u32, PersistenceError>;
}

#[async_trait]
pub trait UserRepo: Send {
    async fn get(&mut self, id: u64) -> Result<Option<User>, PersistenceError>;

    /// With `only_active`, soft-deleted users are ignored
    async fn get_by_phone(
        &mut self,
        phone: &str,
        only_active: bool,
    ) -> Result<Option<User>, PersistenceError>;

    async fn add(&mut self, user: &User) -> Result<(), PersistenceError>;
}

// =============================================================================
// Unit of Work
// =============================================================================

#[async_trait]
pub trait UnitOfWork: Send {
    /// Allocate a fresh session and repositories
    async fn begin(&mut self) -> AppResult<()>;

    /// A session is allocated
    fn is_ready(&self) -> bool;

    fn users(&mut self) -> AppResult<&mut dyn UserRepo>;

    fn otps(&mut self) -> AppResult<&mut dyn OtpRepo>;

    /// Backend commit. Releases the session on success.
    async fn commit_session(&mut self) -> Result<(), PersistenceError>;

    /// Discard the session and every pending change
    async fn rollback(&mut self);

    /// Persist all mutations atomically
    async fn commit(&mut self) -> AppResult<()> {
        if !self.is_ready() {
            return Err(AppError::UnitOfWorkContext);
        }

        match self.commit_session().await {
            Ok(()) => Ok(()),
            Err(PersistenceError::UniqueViolation(what)) => {
                self.rollback().await;
                Err(DomainError::Conflict(what).into())
            }
            Err(err) => {
                self.rollback().await;
                Err(AppError::internal(format!("unit of work commit failed: {}", err)))
            }
        }
    }
}

/// Creates one unit of work per handler invocation
pub trait UnitOfWorkFactory: Send + Sync {
    fn create(&self) -> Box<dyn UnitOfWork>;
}
