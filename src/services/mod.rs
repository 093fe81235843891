//! Capabilities consumed by the workflow handlers

pub mod hash;
pub mod id_generator;
pub mod publisher;
pub mod sms;

pub use hash::{Argon2Hasher, HashError, HashService, HmacHasher};
pub use id_generator::{IdGenerator, SnowflakeIdGenerator};
pub use publisher::{BroadcastPublisher, NotificationKind, Publisher};
pub use sms::{CapturingSmsService, FailingSmsService, LocalSmsService, SentSms, SmsError, SmsService};
