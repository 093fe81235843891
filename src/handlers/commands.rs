//! Command definitions
//!
//! Commands represent intentions to change the system state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{Command, Message, Otp, User, UserSex};

// =========================================================================
// IssueSignupOtp
// =========================================================================

/// Issue a signup OTP for a phone number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSignupOtp {
    pub phone: String,
    /// Requesting origin; verification and signup must come from it too
    pub ipaddr: String,
}

impl IssueSignupOtp {
    pub fn new(phone: impl Into<String>, ipaddr: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            ipaddr: ipaddr.into(),
        }
    }
}

impl Message for IssueSignupOtp {
    fn name(&self) -> &'static str {
        "IssueSignupOtp"
    }
}

impl Command for IssueSignupOtp {
    type Output = Otp;
}

// =========================================================================
// VerifyOtp
// =========================================================================

/// Verify a delivered code
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOtp {
    pub otp_id: u64,
    pub code: String,
    pub ipaddr: String,
}

impl VerifyOtp {
    pub fn new(otp_id: u64, code: impl Into<String>, ipaddr: impl Into<String>) -> Self {
        Self {
            otp_id,
            code: code.into(),
            ipaddr: ipaddr.into(),
        }
    }
}

impl fmt::Debug for VerifyOtp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyOtp")
            .field("otp_id", &self.otp_id)
            .field("code", &"<redacted>")
            .field("ipaddr", &self.ipaddr)
            .finish()
    }
}

impl Message for VerifyOtp {
    fn name(&self) -> &'static str {
        "VerifyOtp"
    }
}

impl Command for VerifyOtp {
    type Output = Otp;
}

// =========================================================================
// Signup
// =========================================================================

/// Create an account from a consumed OTP
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signup {
    pub otp_id: u64,
    pub ipaddr: String,
    pub password: String,
    pub sex: UserSex,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Signup {
    pub fn new(
        otp_id: u64,
        ipaddr: impl Into<String>,
        password: impl Into<String>,
        sex: UserSex,
    ) -> Self {
        Self {
            otp_id,
            ipaddr: ipaddr.into(),
            password: password.into(),
            sex,
            first_name: None,
            last_name: None,
        }
    }

    pub fn with_names(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self.last_name = Some(last_name.into());
        self
    }
}

impl fmt::Debug for Signup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signup")
            .field("otp_id", &self.otp_id)
            .field("ipaddr", &self.ipaddr)
            .field("password", &"<redacted>")
            .field("sex", &self.sex)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish()
    }
}

impl Message for Signup {
    fn name(&self) -> &'static str {
        "Signup"
    }
}

impl Command for Signup {
    type Output = User;
}
