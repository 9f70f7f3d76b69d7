//! User domain model.
//!
//! A user authenticates with a password, a federated identity, or both.
//! At least one of `password_hash` / `federated_id` is always set —
//! clearing the last remaining credential is rejected at the service
//! layer so an account can never be locked out of both factors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flat role label. No hierarchy, no per-resource grants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Member => "Member",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Stored lowercased; unique.
    pub email: String,
    /// Argon2id PHC-format hash. `None` for federated-only accounts.
    pub password_hash: Option<String>,
    /// External identity provider subject ID; unique when present.
    pub federated_id: Option<String>,
    pub display_name: Option<String>,
    pub email_verified: bool,
    pub role: Role,
    pub active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the account has a federated identity attached.
    pub fn is_federated(&self) -> bool {
        self.federated_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// Lowercased by the repository before storage.
    pub email: String,
    /// Pre-hashed — raw passwords never cross the repository boundary.
    pub password_hash: Option<String>,
    pub federated_id: Option<String>,
    pub display_name: Option<String>,
    pub email_verified: bool,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateUser {
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub password_hash: Option<Option<String>>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub federated_id: Option<Option<String>>,
    pub display_name: Option<String>,
    pub email_verified: Option<bool>,
    pub active: Option<bool>,
    pub last_login_at: Option<DateTime<Utc>>,
}
