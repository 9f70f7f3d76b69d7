//! SurrealDB implementation of [`SessionRepository`].
//!
//! Sessions are soft-invalidated: `active = false` instead of deletion,
//! so a revoked refresh token can still be told apart from an unknown
//! one. `created_at` is bound from the caller's clock (nanosecond
//! precision) so oldest-first eviction orders deterministically.

use chrono::{DateTime, Utc};
use gatekey_core::error::CoreResult;
use gatekey_core::models::session::{CreateSession, Session};
use gatekey_core::repository::SessionRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct SessionRow {
    user_id: String,
    refresh_token_hash: String,
    device_fingerprint: String,
    device_label: Option<String>,
    ip_address: Option<String>,
    active: bool,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct SessionRowWithId {
    record_id: String,
    user_id: String,
    refresh_token_hash: String,
    device_fingerprint: String,
    device_label: Option<String>,
    ip_address: Option<String>,
    active: bool,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

fn row_to_session(row: SessionRow, id: Uuid) -> Result<Session, DbError> {
    let user_id = Uuid::parse_str(&row.user_id)
        .map_err(|e| DbError::Migration(format!("invalid user UUID: {e}")))?;
    Ok(Session {
        id,
        user_id,
        refresh_token_hash: row.refresh_token_hash,
        device_fingerprint: row.device_fingerprint,
        device_label: row.device_label,
        ip_address: row.ip_address,
        active: row.active,
        expires_at: row.expires_at,
        created_at: row.created_at,
        last_activity_at: row.last_activity_at,
    })
}

impl SessionRowWithId {
    fn try_into_session(self) -> Result<Session, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Migration(format!("invalid UUID: {e}")))?;
        let user_id = Uuid::parse_str(&self.user_id)
            .map_err(|e| DbError::Migration(format!("invalid user UUID: {e}")))?;
        Ok(Session {
            id,
            user_id,
            refresh_token_hash: self.refresh_token_hash,
            device_fingerprint: self.device_fingerprint,
            device_label: self.device_label,
            ip_address: self.ip_address,
            active: self.active,
            expires_at: self.expires_at,
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// SurrealDB implementation of the Session repository.
#[derive(Clone)]
pub struct SurrealSessionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSessionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> SessionRepository for SurrealSessionRepository<C> {
    async fn create(&self, input: CreateSession) -> CoreResult<Session> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let now = Utc::now();

        let result = self
            .db
            .query(
                "CREATE type::record('session', $id) SET \
                 user_id = $user_id, \
                 refresh_token_hash = $refresh_token_hash, \
                 device_fingerprint = $device_fingerprint, \
                 device_label = $device_label, \
                 ip_address = $ip_address, \
                 active = true, \
                 expires_at = $expires_at, \
                 created_at = $created_at, \
                 last_activity_at = $created_at",
            )
            .bind(("id", id_str.clone()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("refresh_token_hash", input.refresh_token_hash))
            .bind(("device_fingerprint", input.device_fingerprint))
            .bind(("device_label", input.device_label))
            .bind(("ip_address", input.ip_address))
            .bind(("expires_at", input.expires_at))
            .bind(("created_at", now))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "session".into(),
            id: id_str,
        })?;

        row_to_session(row, id).map_err(Into::into)
    }

    async fn get_by_id(&self, id: Uuid) -> CoreResult<Session> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('session', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "session".into(),
            id: id_str,
        })?;

        row_to_session(row, id).map_err(Into::into)
    }

    async fn get_by_token_hash(&self, token_hash: &str) -> CoreResult<Session> {
        let token_hash_owned = token_hash.to_string();

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM session \
                 WHERE refresh_token_hash = $token_hash",
            )
            .bind(("token_hash", token_hash_owned.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "session".into(),
            id: format!("token_hash={token_hash_owned}"),
        })?;

        row.try_into_session().map_err(Into::into)
    }

    async fn list_active(&self, user_id: Uuid) -> CoreResult<Vec<Session>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM session \
                 WHERE user_id = $user_id AND active = true \
                 ORDER BY created_at DESC",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRowWithId> = result.take(0).map_err(DbError::from)?;

        let sessions = rows
            .into_iter()
            .map(|row| row.try_into_session())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(sessions)
    }

    async fn touch(&self, id: Uuid, ip_address: Option<String>) -> CoreResult<()> {
        // `active = true` in the WHERE clause means a touch racing an
        // eviction can never resurrect the session.
        let query = if ip_address.is_some() {
            "UPDATE type::record('session', $id) SET \
             last_activity_at = $now, ip_address = $ip_address \
             WHERE active = true"
        } else {
            "UPDATE type::record('session', $id) SET \
             last_activity_at = $now \
             WHERE active = true"
        };

        let mut builder = self
            .db
            .query(query)
            .bind(("id", id.to_string()))
            .bind(("now", Utc::now()));
        if let Some(ip) = ip_address {
            builder = builder.bind(("ip_address", ip));
        }

        builder.await.map_err(DbError::from)?;

        Ok(())
    }

    async fn rotate_token(&self, id: Uuid, token_hash: String) -> CoreResult<()> {
        self.db
            .query(
                "UPDATE type::record('session', $id) SET \
                 refresh_token_hash = $token_hash \
                 WHERE active = true",
            )
            .bind(("id", id.to_string()))
            .bind(("token_hash", token_hash))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn invalidate(&self, id: Uuid) -> CoreResult<()> {
        self.db
            .query(
                "UPDATE type::record('session', $id) SET active = false \
                 WHERE active = true",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn invalidate_user_sessions(
        &self,
        user_id: Uuid,
        except: Option<Uuid>,
    ) -> CoreResult<u64> {
        let user_id_str = user_id.to_string();
        let except_str = except.map(|id| id.to_string()).unwrap_or_default();

        // Count first, then mutate — the count is what gets reported to
        // the caller ("3 other sessions signed out").
        let filter = if except.is_some() {
            "user_id = $user_id AND active = true AND meta::id(id) != $except"
        } else {
            "user_id = $user_id AND active = true"
        };

        let mut count_result = self
            .db
            .query(format!(
                "SELECT count() AS total FROM session WHERE {filter} GROUP ALL"
            ))
            .bind(("user_id", user_id_str.clone()))
            .bind(("except", except_str.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        self.db
            .query(format!(
                "UPDATE session SET active = false WHERE {filter}"
            ))
            .bind(("user_id", user_id_str))
            .bind(("except", except_str))
            .await
            .map_err(DbError::from)?;

        Ok(total)
    }
}
