//! User entity
//!
//! A registered account. At most one non-deleted user may own a phone number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::entity::{Entity, EventBuffer};

/// User sex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserSex {
    Male,
    Female,
    Other,
}

impl UserSex {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserSex::Male => "male",
            UserSex::Female => "female",
            UserSex::Other => "other",
        }
    }
}

impl fmt::Display for UserSex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserSex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(UserSex::Male),
            "female" => Ok(UserSex::Female),
            "other" => Ok(UserSex::Other),
            other => Err(format!("unknown user sex: {}", other)),
        }
    }
}

/// User status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    #[default]
    Inactive,
    Banned,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Banned => "banned",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            "banned" => Ok(UserStatus::Banned),
            other => Err(format!("unknown user status: {}", other)),
        }
    }
}

/// Registered user
#[derive(Debug, Clone)]
pub struct User {
    pub id: u64,
    pub phone: String,
    pub pwdhash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub sex: UserSex,
    pub status: UserStatus,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker
    pub deleted_at: Option<DateTime<Utc>>,
    events: EventBuffer,
}

impl User {
    /// Create a new user from a verified phone number
    pub fn register(
        id: u64,
        phone: String,
        pwdhash: String,
        sex: UserSex,
        first_name: Option<String>,
        last_name: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            phone,
            pwdhash,
            first_name,
            last_name,
            sex,
            status: UserStatus::default(),
            is_admin: false,
            created_at,
            updated_at: created_at,
            deleted_at: None,
            events: EventBuffer::new(),
        }
    }

    /// Rebuild a user from persisted state
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: u64,
        phone: String,
        pwdhash: String,
        first_name: Option<String>,
        last_name: Option<String>,
        sex: UserSex,
        status: UserStatus,
        is_admin: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            phone,
            pwdhash,
            first_name,
            last_name,
            sex,
            status,
            is_admin,
            created_at,
            updated_at,
            deleted_at,
            events: EventBuffer::new(),
        }
    }

    /// Not soft-deleted
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

impl Entity for User {
    fn events(&self) -> &EventBuffer {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventBuffer {
        &mut self.events
    }
}
