//! SurrealDB implementation of [`PasswordHistoryRepository`].

use chrono::{DateTime, Utc};
use gatekey_core::error::CoreResult;
use gatekey_core::models::password_history::{CreatePasswordHistoryEntry, PasswordHistoryEntry};
use gatekey_core::repository::PasswordHistoryRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct HistoryRow {
    user_id: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct HistoryRowWithId {
    record_id: String,
    user_id: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl HistoryRowWithId {
    fn try_into_entry(self) -> Result<PasswordHistoryEntry, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Migration(format!("invalid UUID: {e}")))?;
        let user_id = Uuid::parse_str(&self.user_id)
            .map_err(|e| DbError::Migration(format!("invalid user UUID: {e}")))?;
        Ok(PasswordHistoryEntry {
            id,
            user_id,
            password_hash: self.password_hash,
            created_at: self.created_at,
        })
    }
}

/// SurrealDB implementation of the password history repository.
#[derive(Clone)]
pub struct SurrealPasswordHistoryRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPasswordHistoryRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> PasswordHistoryRepository for SurrealPasswordHistoryRepository<C> {
    async fn append(&self, input: CreatePasswordHistoryEntry) -> CoreResult<PasswordHistoryEntry> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let user_id = input.user_id;
        // Caller-side timestamp: sub-millisecond precision keeps
        // prune ordering deterministic for back-to-back changes.
        let now = Utc::now();

        let result = self
            .db
            .query(
                "CREATE type::record('password_history', $id) SET \
                 user_id = $user_id, \
                 password_hash = $password_hash, \
                 created_at = $created_at",
            )
            .bind(("id", id_str.clone()))
            .bind(("user_id", user_id.to_string()))
            .bind(("password_hash", input.password_hash))
            .bind(("created_at", now))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<HistoryRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "password_history".into(),
            id: id_str,
        })?;

        Ok(PasswordHistoryEntry {
            id,
            user_id,
            password_hash: row.password_hash,
            created_at: row.created_at,
        })
    }

    async fn list_recent(&self, user_id: Uuid, limit: u32) -> CoreResult<Vec<PasswordHistoryEntry>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM password_history \
                 WHERE user_id = $user_id \
                 ORDER BY created_at DESC \
                 LIMIT $limit",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("limit", limit as u64))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<HistoryRowWithId> = result.take(0).map_err(DbError::from)?;

        let entries = rows
            .into_iter()
            .map(|row| row.try_into_entry())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(entries)
    }

    async fn prune(&self, user_id: Uuid, keep: u32) -> CoreResult<u64> {
        // Fetch all entries newest-first, then delete everything past
        // the keep window by record ID.
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM password_history \
                 WHERE user_id = $user_id \
                 ORDER BY created_at DESC",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<HistoryRowWithId> = result.take(0).map_err(DbError::from)?;

        let mut removed = 0u64;
        for row in rows.into_iter().skip(keep as usize) {
            self.db
                .query("DELETE type::record('password_history', $id)")
                .bind(("id", row.record_id))
                .await
                .map_err(DbError::from)?;
            removed += 1;
        }

        Ok(removed)
    }
}
