//! One-time passcode entity
//!
//! An OTP proves control of a phone number before an account is created.
//! Its status only ever moves forward: issued -> sent -> consumed -> used.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use super::entity::{Entity, EventBuffer};
use super::error::DomainError;

/// Purpose an OTP was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpIntent {
    SignUp,
}

impl OtpIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpIntent::SignUp => "sign_up",
        }
    }
}

impl fmt::Display for OtpIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtpIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sign_up" => Ok(OtpIntent::SignUp),
            other => Err(format!("unknown OTP intent: {}", other)),
        }
    }
}

/// OTP lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpStatus {
    Issued,
    Sent,
    Consumed,
    Used,
}

impl OtpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpStatus::Issued => "issued",
            OtpStatus::Sent => "sent",
            OtpStatus::Consumed => "consumed",
            OtpStatus::Used => "used",
        }
    }

    /// Only single forward steps are allowed
    pub fn can_transition_to(&self, next: OtpStatus) -> bool {
        matches!(
            (self, next),
            (OtpStatus::Issued, OtpStatus::Sent)
                | (OtpStatus::Sent, OtpStatus::Consumed)
                | (OtpStatus::Consumed, OtpStatus::Used)
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == OtpStatus::Used
    }
}

impl fmt::Display for OtpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issued" => Ok(OtpStatus::Issued),
            "sent" => Ok(OtpStatus::Sent),
            "consumed" => Ok(OtpStatus::Consumed),
            "used" => Ok(OtpStatus::Used),
            other => Err(format!("unknown OTP status: {}", other)),
        }
    }
}

/// One-time passcode
///
/// The plaintext code is never stored; only its keyed hash.
#[derive(Debug, Clone)]
pub struct Otp {
    pub id: u64,
    pub phone: String,
    pub intent: OtpIntent,
    pub status: OtpStatus,
    pub otp_hash: String,
    pub attempts: u32,
    /// Origin the OTP was requested from; verification and signup must match it
    pub ipaddr: String,
    /// Append-only audit map
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    events: EventBuffer,
}

impl Otp {
    // =========================================================================
    // Otp::issue()
    // =========================================================================

    /// Create a freshly issued OTP
    pub fn issue(
        id: u64,
        phone: String,
        intent: OtpIntent,
        otp_hash: String,
        ipaddr: String,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            phone,
            intent,
            status: OtpStatus::Issued,
            otp_hash,
            attempts: 0,
            ipaddr,
            metadata: Map::new(),
            created_at,
            expires_at,
            consumed_at: None,
            events: EventBuffer::new(),
        }
    }

    /// Rebuild an OTP from persisted state
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: u64,
        phone: String,
        intent: OtpIntent,
        status: OtpStatus,
        otp_hash: String,
        attempts: u32,
        ipaddr: String,
        metadata: Map<String, Value>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        consumed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            phone,
            intent,
            status,
            otp_hash,
            attempts,
            ipaddr,
            metadata,
            created_at,
            expires_at,
            consumed_at,
            events: EventBuffer::new(),
        }
    }

    /// `now >= expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// issued -> sent, recording the delivery receipt
    pub fn mark_sent(&mut self, message_id: &str, sent_at: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(OtpStatus::Sent)?;
        self.append_metadata("otp_sent_at", json!(sent_at.to_rfc3339()));
        self.append_metadata("message_id", json!(message_id));
        Ok(())
    }

    /// Count a wrong code and append its audit record
    pub fn record_failed_attempt(&mut self, tried_code: &str, tried_at: DateTime<Utc>) {
        self.attempts += 1;
        let key = format!("attempt[{}]", self.attempts);
        self.append_metadata(
            &key,
            json!({
                "tried_code": tried_code,
                "tried_at": tried_at.to_rfc3339(),
            }),
        );
    }

    /// sent -> consumed
    pub fn consume(&mut self, consumed_at: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(OtpStatus::Consumed)?;
        self.consumed_at = Some(consumed_at);
        Ok(())
    }

    /// consumed -> used, recording the origin that completed signup
    pub fn mark_used(&mut self, signup_ipaddr: &str) -> Result<(), DomainError> {
        self.transition(OtpStatus::Used)?;
        self.append_metadata("used_for_signup_ip", json!(signup_ipaddr));
        Ok(())
    }

    fn transition(&mut self, next: OtpStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    // Existing keys are never overwritten
    fn append_metadata(&mut self, key: &str, value: Value) {
        self.metadata.entry(key.to_string()).or_insert(value);
    }
}

impl Entity for Otp {
    fn events(&self) -> &EventBuffer {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventBuffer {
        &mut self.events
    }
}
