//! In-memory Unit of Work
//!
//! The store's lock is held for the whole transaction, so units run one at
//! a time and a second locking read waits exactly like a Postgres row lock.
//! Changes are made to a staged copy that replaces the tables on commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{OtpLock, OtpRepo, PersistenceError, UnitOfWork, UnitOfWorkFactory, UserRepo};
use crate::domain::{Entity, Otp, User};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
struct Tables {
    otps: BTreeMap<u64, Otp>,
    users: BTreeMap<u64, User>,
}

/// Shared in-process storage
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit_of_work(&self) -> InMemoryUnitOfWork {
        InMemoryUnitOfWork {
            store: self.clone(),
            session: None,
        }
    }

    /// Committed snapshot of an OTP
    pub async fn otp(&self, id: u64) -> Option<Otp> {
        self.tables.lock().await.otps.get(&id).cloned()
    }

    /// Committed snapshot of the active user owning `phone`
    pub async fn active_user_by_phone(&self, phone: &str) -> Option<User> {
        self.tables
            .lock()
            .await
            .users
            .values()
            .find(|u| u.phone == phone && u.is_active())
            .cloned()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }

    pub async fn otp_count(&self) -> usize {
        self.tables.lock().await.otps.len()
    }

    /// Insert committed rows directly, bypassing any unit of work
    pub async fn seed_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.id, detached(user));
    }

    pub async fn seed_otp(&self, otp: Otp) {
        self.tables.lock().await.otps.insert(otp.id, detached(otp));
    }
}

impl UnitOfWorkFactory for InMemoryStore {
    fn create(&self) -> Box<dyn UnitOfWork> {
        Box::new(self.unit_of_work())
    }
}

// Stored rows never carry pending events
fn detached<E: Entity>(mut entity: E) -> E {
    entity.take_events();
    entity
}

struct Session {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

pub struct InMemoryUnitOfWork {
    store: InMemoryStore,
    session: Option<Session>,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn begin(&mut self) -> AppResult<()> {
        // Release any previous session before waiting on the lock again
        self.session = None;

        let guard = self.store.tables.clone().lock_owned().await;
        let staged = guard.clone();
        self.session = Some(Session { guard, staged });
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
        let Some(mut session) = self.session.take() else {
            return Err(PersistenceError::Backend("no active session".to_string()));
        };
        *session.guard = session.staged;
        Ok(())
    }

    async fn rollback(&mut self) {
        self.session = None;
    }
}

#[async_trait]
impl OtpRepo for Session {
    async fn get(&mut self, id: u64) -> Result<Option<Otp>, PersistenceError> {
        Ok(self.staged.otps.get(&id).cloned())
    }

    async fn get_for_update(&mut self, lock: OtpLock<'_>) -> Result<Option<Otp>, PersistenceError> {
        Ok(self
            .staged
            .otps
            .get(&lock.id)
            .filter(|otp| otp.status == lock.status && otp.ipaddr == lock.ipaddr)
            .cloned())
    }

    async fn add(&mut self, otp: &Otp) -> Result<(), PersistenceError> {
        if self.staged.otps.contains_key(&otp.id) {
            return Err(PersistenceError::UniqueViolation("otps_pkey".to_string()));
        }
        self.staged.otps.insert(otp.id, detached(otp.clone()));
        Ok(())
    }

    async fn update(&mut self, otp: &Otp) -> Result<(), PersistenceError> {
        match self.staged.otps.get_mut(&otp.id) {
            Some(row) => {
                *row = detached(otp.clone());
                Ok(())
            }
            None => Err(PersistenceError::Backend(format!("otp {} does not exist", otp.id))),
        }
    }

    async fn count_issued_since(
        &mut self,
        phone: &str,
        ipaddr: &str,
        since: DateTime<Utc>,
    ) -> Result<u32, PersistenceError> {
        let count = self
            .staged
            .otps
            .values()
            .filter(|otp| otp.created_at >= since && (otp.phone == phone || otp.ipaddr == ipaddr))
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[async_trait]
impl UserRepo for Session {
    async fn get(&mut self, id: u64) -> Result<Option<User>, PersistenceError> {
        Ok(self.staged.users.get(&id).cloned())
    }

    async fn get_by_phone(
        &mut self,
        phone: &str,
        only_active: bool,
    ) -> Result<Option<User>, PersistenceError> {
        Ok(self
            .staged
            .users
            .values()
            .find(|u| u.phone == phone && (!only_active || u.is_active()))
            .cloned())
    }

    async fn add(&mut self, user: &User) -> Result<(), PersistenceError> {
        if self.staged.users.contains_key(&user.id) {
            return Err(PersistenceError::UniqueViolation("users_pkey".to_string()));
        }
        let phone_taken = user.is_active()
            && self
                .staged
                .users
                .values()
                .any(|u| u.phone == user.phone && u.is_active());
        if phone_taken {
            return Err(PersistenceError::UniqueViolation(
                "users_phone_active_key".to_string(),
            ));
        }
        self.staged.users.insert(user.id, detached(user.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainError, OtpIntent, OtpStatus, UserSex};
    use chrono::Duration;

    fn otp(id: u64, phone: &str, ipaddr: &str) -> Otp {
        let now = Utc::now();
        Otp::issue(
            id,
            phone.to_string(),
            OtpIntent::SignUp,
            "hash".to_string(),
            ipaddr.to_string(),
            now,
            now + Duration::minutes(5),
        )
    }

    fn user(id: u64, phone: &str) -> User {
        User::register(
            id,
            phone.to_string(),
            "pwd".to_string(),
            UserSex::Other,
            None,
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_commit_outside_scope_is_misuse() {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();

        let err = uow.commit().await.unwrap_err();
        assert!(matches!(err, AppError::UnitOfWorkContext));
        assert!(matches!(uow.otps().err(), Some(AppError::UnitOfWorkContext)));
    }

    #[tokio::test]
    async fn test_commit_persists_and_ends_scope() {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();

        uow.begin().await.unwrap();
        uow.otps().unwrap().add(&otp(1, "+1", "ip")).await.unwrap();
        uow.commit().await.unwrap();

        assert!(!uow.is_ready());
        assert!(store.otp(1).await.is_some());

        // A committed unit cannot be committed again
        assert!(matches!(uow.commit().await, Err(AppError::UnitOfWorkContext)));
    }

    #[tokio::test]
    async fn test_drop_without_commit_discards_changes() {
        let store = InMemoryStore::new();

        {
            let mut uow = store.unit_of_work();
            uow.begin().await.unwrap();
            uow.otps().unwrap().add(&otp(1, "+1", "ip")).await.unwrap();
        }

        assert_eq!(store.otp_count().await, 0);
    }

    #[tokio::test]
    async fn test_explicit_rollback_discards_changes() {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();

        uow.begin().await.unwrap();
        uow.users().unwrap().add(&user(1, "+1")).await.unwrap();
        uow.rollback().await;

        assert!(!uow.is_ready());
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_get_user_by_id() {
        let store = InMemoryStore::new();
        store.seed_user(user(7, "+7")).await;

        let mut uow = store.unit_of_work();
        uow.begin().await.unwrap();
        let users = uow.users().unwrap();

        assert_eq!(users.get(7).await.unwrap().unwrap().phone, "+7");
        assert!(users.get(8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_active_phone_is_conflict() {
        let store = InMemoryStore::new();
        store.seed_user(user(1, "+1")).await;

        let mut uow = store.unit_of_work();
        uow.begin().await.unwrap();
        let err: AppError = uow
            .users()
            .unwrap()
            .add(&user(2, "+1"))
            .await
            .unwrap_err()
            .into();

        assert!(matches!(err, AppError::Domain(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_deleted_user_frees_phone() {
        let store = InMemoryStore::new();
        let mut deleted = user(1, "+1");
        deleted.deleted_at = Some(Utc::now());
        store.seed_user(deleted).await;

        let mut uow = store.unit_of_work();
        uow.begin().await.unwrap();
        assert!(uow.users().unwrap().get_by_phone("+1", true).await.unwrap().is_none());
        assert!(uow.users().unwrap().get_by_phone("+1", false).await.unwrap().is_some());
        uow.users().unwrap().add(&user(2, "+1")).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(store.active_user_by_phone("+1").await.map(|u| u.id), Some(2));
    }

    #[tokio::test]
    async fn test_locking_read_filters_on_every_dimension() {
        let store = InMemoryStore::new();
        store.seed_otp(otp(1, "+1", "10.0.0.1")).await;

        let mut uow = store.unit_of_work();
        uow.begin().await.unwrap();
        let repo = uow.otps().unwrap();

        let lock = |status, ipaddr| OtpLock { id: 1, status, ipaddr };
        assert!(repo.get_for_update(lock(OtpStatus::Issued, "10.0.0.1")).await.unwrap().is_some());
        assert!(repo.get_for_update(lock(OtpStatus::Sent, "10.0.0.1")).await.unwrap().is_none());
        assert!(repo.get_for_update(lock(OtpStatus::Issued, "10.0.0.2")).await.unwrap().is_none());
        assert!(repo
            .get_for_update(OtpLock { id: 2, status: OtpStatus::Issued, ipaddr: "10.0.0.1" })
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_count_issued_since_matches_phone_or_origin() {
        let store = InMemoryStore::new();
        store.seed_otp(otp(1, "+1", "a")).await;
        store.seed_otp(otp(2, "+2", "b")).await;
        store.seed_otp(otp(3, "+3", "a")).await;

        let mut uow = store.unit_of_work();
        uow.begin().await.unwrap();
        let since = Utc::now() - Duration::minutes(1);
        let repo = uow.otps().unwrap();

        assert_eq!(repo.count_issued_since("+1", "z", since).await.unwrap(), 1);
        assert_eq!(repo.count_issued_since("+9", "a", since).await.unwrap(), 2);
        assert_eq!(repo.count_issued_since("+2", "a", since).await.unwrap(), 3);
        assert_eq!(
            repo.count_issued_since("+1", "a", Utc::now() + Duration::minutes(1))
                .await
                .unwrap(),
            0
        );
    }
}
