//! SMS delivery capability

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;

use crate::config::Config;
use crate::domain::OtpIntent;
use crate::error::{AppError, AppResult};

/// Provider-level failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum SmsError {
    #[error("SMS transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait SmsService: Send + Sync {
    /// Deliver a text and return the provider's message id
    async fn send_sms(&self, phone: &str, text: &str) -> Result<String, SmsError>;

    /// Deliver an OTP code
    async fn send_otp(&self, phone: &str, code: &str, intent: OtpIntent) -> AppResult<String> {
        let text = format!("Your OTP code for {} is {}", intent, code);

        self.send_sms(phone, &text).await.map_err(|err| {
            tracing::error!(intent = %intent, error = %err, "Failed to send OTP SMS");
            AppError::SmsSendFailed(err.to_string())
        })
    }
}

/// Development adapter: logs the message instead of sending it
#[derive(Debug, Default)]
pub struct LocalSmsService;

impl LocalSmsService {
    pub fn new() -> Self {
        Self
    }

    /// Development adapter for `config`; refused in production since it
    /// writes message text, OTP codes included, to the log
    pub fn for_environment(config: &Config) -> AppResult<Self> {
        if config.is_production() {
            return Err(AppError::internal(
                "LocalSmsService is not allowed in production; configure an SMS provider",
            ));
        }
        Ok(Self)
    }
}

#[async_trait]
impl SmsService for LocalSmsService {
    async fn send_sms(&self, phone: &str, text: &str) -> Result<String, SmsError> {
        let message_id = rand::thread_rng().gen_range(1000..=9999).to_string();
        tracing::info!(phone = %phone, message_id = %message_id, "Local SMS");
        tracing::debug!(message_id = %message_id, text = %text, "Local SMS text");
        Ok(message_id)
    }
}

/// A delivered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSms {
    pub phone: String,
    pub text: String,
}

impl SentSms {
    /// The code at the end of an OTP message
    pub fn code(&self) -> Option<&str> {
        self.text.rsplit(' ').next().filter(|c| c.chars().all(|ch| ch.is_ascii_digit()))
    }
}

/// Keeps every message in memory. Used by tests and the load-test binary.
#[derive(Debug, Default)]
pub struct CapturingSmsService {
    sent: Mutex<Vec<SentSms>>,
}

impl CapturingSmsService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentSms> {
        self.sent.lock().clone()
    }

    /// Code of the most recent message to `phone`
    pub fn last_code_for(&self, phone: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|sms| sms.phone == phone)
            .and_then(|sms| sms.code().map(str::to_string))
    }
}

#[async_trait]
impl SmsService for CapturingSmsService {
    async fn send_sms(&self, phone: &str, text: &str) -> Result<String, SmsError> {
        let mut sent = self.sent.lock();
        sent.push(SentSms {
            phone: phone.to_string(),
            text: text.to_string(),
        });
        Ok(format!("capture-{}", sent.len()))
    }
}

/// Always fails. Used to exercise delivery failure paths.
#[derive(Debug, Default)]
pub struct FailingSmsService;

#[async_trait]
impl SmsService for FailingSmsService {
    async fn send_sms(&self, _phone: &str, _text: &str) -> Result<String, SmsError> {
        Err(SmsError::Transport("provider unreachable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_otp_text_names_intent_and_code() {
        let sms = CapturingSmsService::new();

        let id = sms.send_otp("+989121234567", "0420", OtpIntent::SignUp).await.unwrap();

        assert_eq!(id, "capture-1");
        assert_eq!(sms.sent()[0].text, "Your OTP code for sign_up is 0420");
        assert_eq!(sms.last_code_for("+989121234567").as_deref(), Some("0420"));
        assert_eq!(sms.last_code_for("+1"), None);
    }

    #[tokio::test]
    async fn test_transport_error_maps_to_sms_send_failed() {
        let err = FailingSmsService
            .send_otp("+1", "1234", OtpIntent::SignUp)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::SmsSendFailed(_)));
    }

    #[test]
    fn test_local_service_refused_in_production() {
        let lookup = |env: &'static str| {
            move |name: &str| match name {
                "DATABASE_URL" => Some("postgres://localhost/db".to_string()),
                "ENVIRONMENT" => Some(env.to_string()),
                "HMAC_SECRET_KEY" => Some("00112233445566778899aabbccddeeff".to_string()),
                _ => None,
            }
        };

        let production = Config::from_lookup(lookup("production")).unwrap();
        let err = LocalSmsService::for_environment(&production).unwrap_err();
        assert!(matches!(err, AppError::Internal { .. }));

        let development = Config::from_lookup(lookup("development")).unwrap();
        assert!(LocalSmsService::for_environment(&development).is_ok());
    }

    #[test]
    fn test_local_service_returns_message_id() {
        let id = tokio_test::block_on(LocalSmsService::new().send_sms("+1", "hello")).unwrap();
        assert_eq!(id.len(), 4);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }
}
