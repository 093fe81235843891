//! Postgres Unit of Work
//!
//! Each unit wraps one `sqlx` transaction. Locking reads use
//! `SELECT ... FOR UPDATE`, so a second verification of the same OTP waits
//! for the first transaction and then re-reads the updated status.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, Transaction};

use super::{OtpLock, OtpRepo, PersistenceError, UnitOfWork, UnitOfWorkFactory, UserRepo};
use crate::domain::{Otp, User};
use crate::error::{AppError, AppResult};

const OTP_COLUMNS: &str = "id, phone, intent, status, otp_hash, attempts, ipaddr, metadata, \
                           created_at, expires_at, consumed_at";

const USER_COLUMNS: &str = "id, phone, pwdhash, first_name, last_name, sex, status, is_admin, \
                            created_at, updated_at, deleted_at";

type OtpRow = (
    i64,
    String,
    String,
    String,
    String,
    i32,
    String,
    Value,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

type UserRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

/// Hands out Postgres units sharing one pool
#[derive(Debug, Clone)]
pub struct PgUnitOfWorkFactory {
    pool: PgPool,
}

impl PgUnitOfWorkFactory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl UnitOfWorkFactory for PgUnitOfWorkFactory {
    fn create(&self) -> Box<dyn UnitOfWork> {
        Box::new(PgUnitOfWork::new(self.pool.clone()))
    }
}

struct PgSession {
    tx: Transaction<'static, Postgres>,
}

/// Unit of work over a single Postgres transaction.
///
/// Dropping it with an open transaction rolls the transaction back.
pub struct PgUnitOfWork {
    pool: PgPool,
    session: Option<PgSession>,
}

impl PgUnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            session: None,
        }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn begin(&mut self) -> AppResult<()> {
        self.rollback().await;

        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::internal(format!("failed to begin transaction: {}", e)))?;
        self.session = Some(PgSession { tx });
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    fn users(&mut self) -> AppResult<&mut dyn UserRepo> {
        match self.session.as_mut() {
            Some(session) => Ok(session as &mut dyn UserRepo),
            None => Err(AppError::UnitOfWorkContext),
        }
    }

    fn otps(&mut self) -> AppResult<&mut dyn OtpRepo> {
        match self.session.as_mut() {
            Some(session) => Ok(session as &mut dyn OtpRepo),
            None => Err(AppError::UnitOfWorkContext),
        }
    }

    async fn commit_session(&mut self) -> Result<(), PersistenceError> {
        let Some(session) = self.session.take() else {
            return Err(PersistenceError::Backend("no active transaction".to_string()));
        };
        session.tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.tx.rollback().await {
                tracing::warn!(error = %e, "Transaction rollback failed");
            }
        }
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn to_db_id(id: u64) -> Result<i64, PersistenceError> {
    i64::try_from(id).map_err(|_| PersistenceError::Backend(format!("id {} exceeds BIGINT", id)))
}

fn from_db_id(id: i64) -> Result<u64, PersistenceError> {
    u64::try_from(id).map_err(|_| PersistenceError::Backend(format!("negative id {}", id)))
}

fn corrupt(column: &str, detail: impl std::fmt::Display) -> PersistenceError {
    PersistenceError::Backend(format!("invalid {} column: {}", column, detail))
}

fn otp_from_row(row: OtpRow) -> Result<Otp, PersistenceError> {
    let (id, phone, intent, status, otp_hash, attempts, ipaddr, metadata, created_at, expires_at, consumed_at) =
        row;

    let metadata = match metadata {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => return Err(corrupt("metadata", other)),
    };

    Ok(Otp::restore(
        from_db_id(id)?,
        phone,
        intent.parse().map_err(|e| corrupt("intent", e))?,
        status.parse().map_err(|e| corrupt("status", e))?,
        otp_hash,
        u32::try_from(attempts).map_err(|e| corrupt("attempts", e))?,
        ipaddr,
        metadata,
        created_at,
        expires_at,
        consumed_at,
    ))
}

fn user_from_row(row: UserRow) -> Result<User, PersistenceError> {
    let (id, phone, pwdhash, first_name, last_name, sex, status, is_admin, created_at, updated_at, deleted_at) =
        row;

    Ok(User::restore(
        from_db_id(id)?,
        phone,
        pwdhash,
        first_name,
        last_name,
        sex.parse().map_err(|e| corrupt("sex", e))?,
        status.parse().map_err(|e| corrupt("status", e))?,
        is_admin,
        created_at,
        updated_at,
        deleted_at,
    ))
}

fn attempts_to_db(attempts: u32) -> Result<i32, PersistenceError> {
    i32::try_from(attempts).map_err(|e| corrupt("attempts", e))
}

// =============================================================================
// Repositories
// =============================================================================

#[async_trait]
impl OtpRepo for PgSession {
    async fn get(&mut self, id: u64) -> Result<Option<Otp>, PersistenceError> {
        let row: Option<OtpRow> =
            sqlx::query_as(&format!("SELECT {} FROM otps WHERE id = $1", OTP_COLUMNS))
                .bind(to_db_id(id)?)
                .fetch_optional(&mut *self.tx)
                .await?;

        row.map(otp_from_row).transpose()
    }

    async fn get_for_update(&mut self, lock: OtpLock<'_>) -> Result<Option<Otp>, PersistenceError> {
        let row: Option<OtpRow> = sqlx::query_as(&format!(
            "SELECT {} FROM otps WHERE id = $1 AND status = $2 AND ipaddr = $3 FOR UPDATE",
            OTP_COLUMNS
        ))
        .bind(to_db_id(lock.id)?)
        .bind(lock.status.as_str())
        .bind(lock.ipaddr)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(otp_from_row).transpose()
    }

    async fn add(&mut self, otp: &Otp) -> Result<(), PersistenceError> {
        sqlx::query(&format!(
            "INSERT INTO otps ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            OTP_COLUMNS
        ))
        .bind(to_db_id(otp.id)?)
        .bind(&otp.phone)
        .bind(otp.intent.as_str())
        .bind(otp.status.as_str())
        .bind(&otp.otp_hash)
        .bind(attempts_to_db(otp.attempts)?)
        .bind(&otp.ipaddr)
        .bind(Value::Object(otp.metadata.clone()))
        .bind(otp.created_at)
        .bind(otp.expires_at)
        .bind(otp.consumed_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update(&mut self, otp: &Otp) -> Result<(), PersistenceError> {
        let result = sqlx::query(
            r#"
            UPDATE otps
            SET status = $2, attempts = $3, metadata = $4, consumed_at = $5
            WHERE id = $1
            "#,
        )
        .bind(to_db_id(otp.id)?)
        .bind(otp.status.as_str())
        .bind(attempts_to_db(otp.attempts)?)
        .bind(Value::Object(otp.metadata.clone()))
        .bind(otp.consumed_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::Backend(format!("otp {} does not exist", otp.id)));
        }
        Ok(())
    }

    async fn count_issued_since(
        &mut self,
        phone: &str,
        ipaddr: &str,
        since: DateTime<Utc>,
    ) -> Result<u32, PersistenceError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM otps
            WHERE created_at >= $3 AND (phone = $1 OR ipaddr = $2)
            "#,
        )
        .bind(phone)
        .bind(ipaddr)
        .bind(since)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[async_trait]
impl UserRepo for PgSession {
    async fn get(&mut self, id: u64) -> Result<Option<User>, PersistenceError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
                .bind(to_db_id(id)?)
                .fetch_optional(&mut *self.tx)
                .await?;

        row.map(user_from_row).transpose()
    }

    async fn get_by_phone(
        &mut self,
        phone: &str,
        only_active: bool,
    ) -> Result<Option<User>, PersistenceError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE phone = $1 AND ($2 = FALSE OR deleted_at IS NULL) \
             ORDER BY created_at DESC LIMIT 1",
            USER_COLUMNS
        ))
        .bind(phone)
        .bind(only_active)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(user_from_row).transpose()
    }

    async fn add(&mut self, user: &User) -> Result<(), PersistenceError> {
        sqlx::query(&format!(
            "INSERT INTO users ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            USER_COLUMNS
        ))
        .bind(to_db_id(user.id)?)
        .bind(&user.phone)
        .bind(&user.pwdhash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.sex.as_str())
        .bind(user.status.as_str())
        .bind(user.is_admin)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.deleted_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_ids_fit_bigint() {
        // 41-bit timestamp, 22 bits of node/worker/sequence
        let max_id = (1u64 << 63) - 1;
        assert_eq!(to_db_id(max_id).unwrap(), i64::MAX);
        assert!(to_db_id(1u64 << 63).is_err());
        assert!(from_db_id(-1).is_err());
    }

    #[test]
    fn test_otp_row_rejects_unknown_status() {
        let now = Utc::now();
        let row: OtpRow = (
            1,
            "+1".to_string(),
            "sign_up".to_string(),
            "expired".to_string(),
            "hash".to_string(),
            0,
            "ip".to_string(),
            Value::Null,
            now,
            now,
            None,
        );

        assert!(matches!(otp_from_row(row), Err(PersistenceError::Backend(_))));
    }
}
