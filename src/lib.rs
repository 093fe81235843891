//! phone_signup Library
//!
//! Re-exports modules for integration testing and the binaries.

pub mod bootstrap;
pub mod bus;
pub mod domain;
pub mod handlers;
pub mod jobs;
pub mod services;
pub mod uow;

pub mod config;
pub mod db;
pub mod error;

pub use bootstrap::{bootstrap, register_handlers, Dependencies};
pub use bus::{HandlerRegistry, MessageBus, WiringError};
pub use config::{Config, ConfigError, OtpConfig, OtpSettings};
pub use domain::{DomainError, Otp, OtpIntent, OtpIssued, OtpStatus, User, UserSex, UserStatus};
pub use error::{AppError, AppResult};
pub use handlers::{IssueSignupOtp, Signup, VerifyOtp};
