//! Signup OTP issuance
//!
//! Persists a fresh OTP in `issued` state and records `OtpIssued`, the only
//! place the plaintext code exists. Delivery happens in the event handler.

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::OsRng;
use rand::Rng;
use std::sync::Arc;

use crate::bus::{Bindings, CommandHandler, Injectable, Param, Signature, WiringError};
use crate::config::OtpConfig;
use crate::domain::{DomainError, Entity, Otp, OtpIntent, OtpIssued};
use crate::error::{AppError, AppResult};
use crate::services::{HashService, IdGenerator};
use crate::uow::UnitOfWorkFactory;

use super::IssueSignupOtp;

/// Handler for signup OTP issuance
pub struct IssueSignupOtpHandler {
    config: Arc<dyn OtpConfig>,
    uow: Arc<dyn UnitOfWorkFactory>,
    idgen: Arc<dyn IdGenerator>,
    hmac_hasher: Arc<dyn HashService>,
}

impl IssueSignupOtpHandler {
    pub fn new(
        config: Arc<dyn OtpConfig>,
        uow: Arc<dyn UnitOfWorkFactory>,
        idgen: Arc<dyn IdGenerator>,
        hmac_hasher: Arc<dyn HashService>,
    ) -> Self {
        Self {
            config,
            uow,
            idgen,
            hmac_hasher,
        }
    }
}

impl Injectable for IssueSignupOtpHandler {
    fn signature() -> Signature {
        Signature::new("IssueSignupOtpHandler")
            .param(Param::message::<IssueSignupOtp>("cmd"))
            .param(Param::required::<Arc<dyn OtpConfig>>("config"))
            .param(Param::required::<Arc<dyn UnitOfWorkFactory>>("uow"))
            .param(Param::required::<Arc<dyn IdGenerator>>("idgen"))
            .param(Param::required::<Arc<dyn HashService>>("hmac_hasher"))
    }

    fn from_bindings(bindings: &Bindings) -> Result<Self, WiringError> {
        Ok(Self::new(
            bindings.get("config")?,
            bindings.get("uow")?,
            bindings.get("idgen")?,
            bindings.get("hmac_hasher")?,
        ))
    }
}

#[async_trait]
impl CommandHandler<IssueSignupOtp> for IssueSignupOtpHandler {
    async fn handle(&self, command: IssueSignupOtp) -> AppResult<Otp> {
        let mut uow = self.uow.create();
        uow.begin().await?;

        if uow.users()?.get_by_phone(&command.phone, true).await?.is_some() {
            tracing::debug!("Signup OTP requested for a registered phone");
            return Err(DomainError::conflict("A user with this phone number already exists").into());
        }

        let now = Utc::now();

        let since = now
            .checked_sub_signed(self.config.otp_rate_limit_window())
            .ok_or_else(|| AppError::internal("OTP rate-limit window out of range"))?;
        let recent = uow
            .otps()?
            .count_issued_since(&command.phone, &command.ipaddr, since)
            .await?;
        if recent >= self.config.otp_rate_limit_max_requests() {
            tracing::warn!(recent, "Signup OTP rate limit reached");
            return Err(DomainError::AttemptLimitReached.into());
        }

        let expires_at = now
            .checked_add_signed(self.config.otp_lifetime())
            .ok_or_else(|| AppError::internal("OTP lifetime out of range"))?;

        let code = generate_code(self.config.otp_length());
        let otp_hash = self.hmac_hasher.hash(&code)?;

        let mut otp = Otp::issue(
            self.idgen.next_id(),
            command.phone,
            OtpIntent::SignUp,
            otp_hash,
            command.ipaddr,
            now,
            expires_at,
        );

        uow.otps()?.add(&otp).await?;
        otp.record_event(OtpIssued::new(otp.id, code));
        uow.commit().await?;

        tracing::info!(otp_id = otp.id, "Signup OTP issued");
        Ok(otp)
    }
}

/// Uniformly random decimal digits from the OS CSPRNG
fn generate_code(length: usize) -> String {
    (0..length)
        .map(|_| char::from(b'0' + OsRng.gen_range(0..10u8)))
        .collect()
}
