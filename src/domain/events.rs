//! Domain Events
//!
//! Events are immutable facts that have happened in the system.

use std::any::Any;
use std::fmt;

use super::message::{Event, Message};

/// An OTP was persisted and its code must be delivered.
///
/// This is the only place the plaintext code exists; it is consumed once by
/// the delivery handler.
#[derive(Clone, PartialEq, Eq)]
pub struct OtpIssued {
    pub otp_id: u64,
    pub code: String,
}

impl OtpIssued {
    pub fn new(otp_id: u64, code: String) -> Self {
        Self { otp_id, code }
    }
}

impl fmt::Debug for OtpIssued {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpIssued")
            .field("otp_id", &self.otp_id)
            .field("code", &"<redacted>")
            .finish()
    }
}

impl Message for OtpIssued {
    fn name(&self) -> &'static str {
        "OtpIssued"
    }
}

impl Event for OtpIssued {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_issued_debug_redacts_code() {
        let event = OtpIssued::new(42, "1234".to_string());
        let rendered = format!("{:?}", event);

        assert!(rendered.contains("42"));
        assert!(!rendered.contains("1234"));
        assert_eq!(event.name(), "OtpIssued");
    }
}
