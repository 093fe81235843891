//! OTP delivery
//!
//! Runs on `OtpIssued`. Sends the code, then moves the OTP to `sent`. If the
//! provider fails nothing is committed and the OTP stays `issued`.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::bus::{Bindings, EventHandler, Injectable, Param, Signature, WiringError};
use crate::domain::OtpIssued;
use crate::error::AppResult;
use crate::services::{NotificationKind, Publisher, SmsService};
use crate::uow::UnitOfWorkFactory;

pub struct SendOtpHandler {
    uow: Arc<dyn UnitOfWorkFactory>,
    sms_service: Arc<dyn SmsService>,
    publisher: Option<Arc<dyn Publisher>>,
}

impl SendOtpHandler {
    pub fn new(uow: Arc<dyn UnitOfWorkFactory>, sms_service: Arc<dyn SmsService>) -> Self {
        Self {
            uow,
            sms_service,
            publisher: None,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    async fn notify(&self, otp_id: u64, message_id: &str) {
        let Some(publisher) = &self.publisher else {
            return;
        };

        let payload = json!({
            "otp_id": otp_id,
            "status": "sent",
            "message_id": message_id,
        });
        if let Err(e) = publisher.publish(NotificationKind::Notification, payload).await {
            tracing::warn!(otp_id, error = %e, "Failed to publish OTP notification");
        }
    }
}

impl Injectable for SendOtpHandler {
    fn signature() -> Signature {
        Signature::new("SendOtpHandler")
            .param(Param::message::<OtpIssued>("event"))
            .param(Param::required::<Arc<dyn UnitOfWorkFactory>>("uow"))
            .param(Param::required::<Arc<dyn SmsService>>("sms_service"))
            .param(Param::optional::<Arc<dyn Publisher>>("publisher"))
    }

    fn from_bindings(bindings: &Bindings) -> Result<Self, WiringError> {
        Ok(Self {
            uow: bindings.get("uow")?,
            sms_service: bindings.get("sms_service")?,
            publisher: bindings.get_optional("publisher")?,
        })
    }
}

#[async_trait]
impl EventHandler<OtpIssued> for SendOtpHandler {
    async fn handle(&self, event: &OtpIssued) -> AppResult<()> {
        tracing::debug!(otp_id = event.otp_id, "Delivering OTP");

        let mut uow = self.uow.create();
        uow.begin().await?;

        let Some(mut otp) = uow.otps()?.get(event.otp_id).await? else {
            tracing::warn!(otp_id = event.otp_id, "OTP not found, skipping delivery");
            return Ok(());
        };

        let message_id = self
            .sms_service
            .send_otp(&otp.phone, &event.code, otp.intent)
            .await?;

        otp.mark_sent(&message_id, Utc::now())?;
        uow.otps()?.update(&otp).await?;
        uow.commit().await?;

        tracing::info!(otp_id = otp.id, message_id = %message_id, "OTP sent");

        self.notify(otp.id, &message_id).await;
        Ok(())
    }
}
