//! Session domain model.
//!
//! One session per authenticated device. Sessions are soft-invalidated
//! (`active = false`) on logout, eviction, or mass revocation so that a
//! presented refresh token can still be classified as revoked rather
//! than unknown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    /// SHA-256 hex of the refresh token. The raw token is never stored.
    pub refresh_token_hash: String,
    /// Opaque value derived from client signals.
    pub device_fingerprint: String,
    /// Human-readable device name, best-effort.
    pub device_label: Option<String>,
    pub ip_address: Option<String>,
    pub active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSession {
    pub user_id: Uuid,
    pub refresh_token_hash: String,
    pub device_fingerprint: String,
    pub device_label: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
}
