//! OTP verification
//!
//! The OTP is locked by id, `sent` status and origin together. Any mismatch,
//! or a code that is not all digits, is reported as the same `AccessDenied`
//! and does not say which check failed.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::bus::{Bindings, CommandHandler, Injectable, Param, Signature, WiringError};
use crate::config::OtpConfig;
use crate::domain::{DomainError, Otp, OtpStatus};
use crate::error::AppResult;
use crate::services::HashService;
use crate::uow::{OtpLock, UnitOfWorkFactory};

use super::VerifyOtp;

/// Handler for OTP verification
pub struct VerifyOtpHandler {
    config: Arc<dyn OtpConfig>,
    uow: Arc<dyn UnitOfWorkFactory>,
    hmac_hasher: Arc<dyn HashService>,
}

impl VerifyOtpHandler {
    pub fn new(
        config: Arc<dyn OtpConfig>,
        uow: Arc<dyn UnitOfWorkFactory>,
        hmac_hasher: Arc<dyn HashService>,
    ) -> Self {
        Self {
            config,
            uow,
            hmac_hasher,
        }
    }
}

impl Injectable for VerifyOtpHandler {
    fn signature() -> Signature {
        Signature::new("VerifyOtpHandler")
            .param(Param::message::<VerifyOtp>("cmd"))
            .param(Param::required::<Arc<dyn OtpConfig>>("config"))
            .param(Param::required::<Arc<dyn UnitOfWorkFactory>>("uow"))
            .param(Param::required::<Arc<dyn HashService>>("hmac_hasher"))
    }

    fn from_bindings(bindings: &Bindings) -> Result<Self, WiringError> {
        Ok(Self::new(
            bindings.get("config")?,
            bindings.get("uow")?,
            bindings.get("hmac_hasher")?,
        ))
    }
}

#[async_trait]
impl CommandHandler<VerifyOtp> for VerifyOtpHandler {
    async fn handle(&self, command: VerifyOtp) -> AppResult<Otp> {
        // Malformed codes are denied before any lookup
        if !is_well_formed_code(&command.code) {
            tracing::debug!(otp_id = command.otp_id, "Malformed OTP code");
            return Err(DomainError::AccessDenied.into());
        }

        let mut uow = self.uow.create();
        uow.begin().await?;

        let lock = OtpLock {
            id: command.otp_id,
            status: OtpStatus::Sent,
            ipaddr: &command.ipaddr,
        };
        let Some(mut otp) = uow.otps()?.get_for_update(lock).await? else {
            tracing::debug!(otp_id = command.otp_id, "OTP missing, not in sent state, or origin mismatch");
            return Err(DomainError::AccessDenied.into());
        };

        let max_attempts = self.config.otp_max_attempts();
        if otp.attempts >= max_attempts {
            tracing::debug!(otp_id = otp.id, "OTP verification attempts exhausted");
            return Err(DomainError::AttemptLimitReached.into());
        }

        let now = Utc::now();
        if otp.is_expired_at(now) {
            tracing::debug!(otp_id = otp.id, expires_at = %otp.expires_at, "OTP expired");
            return Err(DomainError::AccessDenied.into());
        }

        let matches = self
            .hmac_hasher
            .verify(&command.code, &otp.otp_hash)
            .map_err(|e| {
                tracing::error!(otp_id = otp.id, error = %e, "OTP code check failed");
                DomainError::AccessDenied
            })?;

        if !matches {
            otp.record_failed_attempt(&command.code, now);
            uow.otps()?.update(&otp).await?;
            uow.commit().await?;

            tracing::debug!(otp_id = otp.id, attempts = otp.attempts, "Wrong OTP code");

            // The attempt that exhausts the budget already reports the limit
            if otp.attempts >= max_attempts {
                return Err(DomainError::AttemptLimitReached.into());
            }
            return Err(DomainError::AccessDenied.into());
        }

        otp.consume(now)?;
        uow.otps()?.update(&otp).await?;
        uow.commit().await?;

        tracing::info!(otp_id = otp.id, "OTP verified");
        Ok(otp)
    }
}

/// Non-empty ASCII digits
fn is_well_formed_code(code: &str) -> bool {
    !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit())
}
