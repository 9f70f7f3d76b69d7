//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Implementations live in
//! `gatekey-db`; the auth layer depends only on these traits.

use uuid::Uuid;

use crate::error::CoreResult;
use crate::models::{
    password_history::{CreatePasswordHistoryEntry, PasswordHistoryEntry},
    session::{CreateSession, Session},
    user::{CreateUser, UpdateUser, User},
};

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = CoreResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = CoreResult<User>> + Send;
    /// Case-insensitive — the lookup key is lowercased before the query.
    fn get_by_email(&self, email: &str) -> impl Future<Output = CoreResult<User>> + Send;
    fn get_by_federated_id(
        &self,
        federated_id: &str,
    ) -> impl Future<Output = CoreResult<User>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateUser,
    ) -> impl Future<Output = CoreResult<User>> + Send;
}

pub trait SessionRepository: Send + Sync {
    fn create(&self, input: CreateSession) -> impl Future<Output = CoreResult<Session>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = CoreResult<Session>> + Send;
    /// Returns inactive sessions too — callers distinguish revoked from
    /// unknown.
    fn get_by_token_hash(
        &self,
        token_hash: &str,
    ) -> impl Future<Output = CoreResult<Session>> + Send;
    /// Active sessions for a user, newest-first by `created_at`.
    fn list_active(&self, user_id: Uuid) -> impl Future<Output = CoreResult<Vec<Session>>> + Send;
    /// Update `last_activity_at` (and optionally the IP) on an active
    /// session. A no-op on inactive sessions — never resurrects.
    fn touch(
        &self,
        id: Uuid,
        ip_address: Option<String>,
    ) -> impl Future<Output = CoreResult<()>> + Send;
    /// Replace the stored refresh token hash (rotation-on-refresh).
    fn rotate_token(
        &self,
        id: Uuid,
        token_hash: String,
    ) -> impl Future<Output = CoreResult<()>> + Send;
    /// Mark a single session inactive. Idempotent.
    fn invalidate(&self, id: Uuid) -> impl Future<Output = CoreResult<()>> + Send;
    /// Mark all of a user's active sessions inactive, optionally sparing
    /// one. Returns the number invalidated. Idempotent.
    fn invalidate_user_sessions(
        &self,
        user_id: Uuid,
        except: Option<Uuid>,
    ) -> impl Future<Output = CoreResult<u64>> + Send;
}

pub trait PasswordHistoryRepository: Send + Sync {
    fn append(
        &self,
        input: CreatePasswordHistoryEntry,
    ) -> impl Future<Output = CoreResult<PasswordHistoryEntry>> + Send;
    /// Newest-first, at most `limit` entries.
    fn list_recent(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> impl Future<Output = CoreResult<Vec<PasswordHistoryEntry>>> + Send;
    /// Delete all but the newest `keep` entries. Returns the number
    /// removed.
    fn prune(&self, user_id: Uuid, keep: u32) -> impl Future<Output = CoreResult<u64>> + Send;
}
