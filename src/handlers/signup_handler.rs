//! Account creation
//!
//! Completes signup from a `consumed` OTP requested by the same origin that
//! verified it. The OTP becomes `used` and the user is created in the same
//! transaction.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::bus::{Bindings, CommandHandler, Injectable, Param, Signature, WiringError};
use crate::domain::{DomainError, OtpStatus, User};
use crate::error::{AppError, AppResult};
use crate::services::{HashService, IdGenerator};
use crate::uow::{OtpLock, PersistenceError, UnitOfWorkFactory};

use super::Signup;

/// Handler for signup
pub struct SignupHandler {
    uow: Arc<dyn UnitOfWorkFactory>,
    pwd_hasher: Arc<dyn HashService>,
    idgen: Arc<dyn IdGenerator>,
}

impl SignupHandler {
    pub fn new(
        uow: Arc<dyn UnitOfWorkFactory>,
        pwd_hasher: Arc<dyn HashService>,
        idgen: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            uow,
            pwd_hasher,
            idgen,
        }
    }
}

impl Injectable for SignupHandler {
    fn signature() -> Signature {
        Signature::new("SignupHandler")
            .param(Param::message::<Signup>("cmd"))
            .param(Param::required::<Arc<dyn UnitOfWorkFactory>>("uow"))
            .param(Param::required::<Arc<dyn HashService>>("pwd_hasher"))
            .param(Param::required::<Arc<dyn IdGenerator>>("idgen"))
    }

    fn from_bindings(bindings: &Bindings) -> Result<Self, WiringError> {
        Ok(Self::new(
            bindings.get("uow")?,
            bindings.get("pwd_hasher")?,
            bindings.get("idgen")?,
        ))
    }
}

#[async_trait]
impl CommandHandler<Signup> for SignupHandler {
    async fn handle(&self, command: Signup) -> AppResult<User> {
        let mut uow = self.uow.create();
        uow.begin().await?;

        let lock = OtpLock {
            id: command.otp_id,
            status: OtpStatus::Consumed,
            ipaddr: &command.ipaddr,
        };
        let Some(mut otp) = uow.otps()?.get_for_update(lock).await? else {
            tracing::debug!(otp_id = command.otp_id, "No consumed OTP for this origin");
            return Err(DomainError::not_found("consumed OTP").into());
        };

        otp.mark_used(&command.ipaddr)?;

        let pwdhash = hash_password(Arc::clone(&self.pwd_hasher), command.password).await?;
        let user = User::register(
            self.idgen.next_id(),
            otp.phone.clone(),
            pwdhash,
            command.sex,
            command.first_name,
            command.last_name,
            Utc::now(),
        );

        uow.users()?.add(&user).await.map_err(|e| match e {
            PersistenceError::UniqueViolation(_) => {
                AppError::from(DomainError::conflict("A user with this phone number already exists"))
            }
            other => other.into(),
        })?;
        uow.otps()?.update(&otp).await?;
        uow.commit().await?;

        tracing::info!(user_id = user.id, otp_id = otp.id, "User signed up");
        Ok(user)
    }
}

// Password hashing is CPU-bound; keep it off the async workers
async fn hash_password(hasher: Arc<dyn HashService>, password: String) -> AppResult<String> {
    let digest = tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| AppError::internal(format!("Password hashing task failed: {}", e)))??;
    Ok(digest)
}
