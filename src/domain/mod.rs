//! Domain module
//!
//! Core domain types and business rules.

pub mod entity;
pub mod error;
pub mod events;
pub mod message;
pub mod otp;
pub mod user;

pub use entity::{Entity, EventBuffer};
pub use error::DomainError;
pub use events::OtpIssued;
pub use message::{Command, Event, Message};
pub use otp::{Otp, OtpIntent, OtpStatus};
pub use user::{User, UserSex, UserStatus};
