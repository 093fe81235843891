//! Command and event handlers
//!
//! The OTP signup workflow. Each handler opens its own unit of work and is
//! wired to its capabilities through the injector.

mod commands;
mod issue_otp_handler;
mod send_otp_handler;
mod signup_handler;
mod verify_otp_handler;


pub use commands::*;
pub use issue_otp_handler::IssueSignupOtpHandler;
pub use send_otp_handler::SendOtpHandler;
pub use signup_handler::SignupHandler;
pub use verify_otp_handler::VerifyOtpHandler;
