//! Password history domain model.
//!
//! Entries exist only for reuse rejection — they are never used for
//! login. Only the newest few entries per user are retained; the
//! retention count is configured at the service layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordHistoryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePasswordHistoryEntry {
    pub user_id: Uuid,
    pub password_hash: String,
}
