//! Bounded per-user session registry.
//!
//! All mutating operations for a given user are serialized through a
//! per-user async mutex; operations for different users proceed fully
//! in parallel. Callers must do their CPU-bound hashing *before*
//! calling in — nothing here blocks on anything but the store itself,
//! and no collaborator calls happen under a lock.

use std::sync::Arc;

use dashmap::DashMap;
use gatekey_core::error::CoreResult;
use gatekey_core::models::session::{CreateSession, Session};
use gatekey_core::repository::SessionRepository;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Session registry enforcing the max-active-sessions invariant.
pub struct SessionStore<S: SessionRepository> {
    repo: S,
    max_sessions_per_user: u32,
    user_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl<S: SessionRepository> SessionStore<S> {
    pub fn new(repo: S, max_sessions_per_user: u32) -> Self {
        Self {
            repo,
            max_sessions_per_user,
            user_locks: DashMap::new(),
        }
    }

    fn user_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Insert a new active session, then evict oldest-first down to the
    /// limit. Returns the new session and whatever was evicted.
    ///
    /// Insert and eviction happen inside the owner's critical section,
    /// so two simultaneous logins for the same user cannot both slip
    /// past the limit. Once this returns `Ok`, the registration is
    /// authoritative — caller cancellation cannot undo it. If the
    /// eviction pass fails, the just-inserted session is invalidated
    /// before the error propagates, so a failed registration never
    /// leaves an extra active session behind.
    pub async fn register(&self, input: CreateSession) -> CoreResult<(Session, Vec<Session>)> {
        let user_id = input.user_id;
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let session = self.repo.create(input).await?;

        match self.evict_over_limit(user_id).await {
            Ok(evicted) => Ok((session, evicted)),
            Err(err) => {
                if let Err(rollback_err) = self.repo.invalidate(session.id).await {
                    warn!(
                        session_id = %session.id,
                        user_id = %user_id,
                        error = %rollback_err,
                        "Failed to invalidate session after eviction error"
                    );
                }
                Err(err)
            }
        }
    }

    /// Invalidate active sessions past the limit, oldest first.
    async fn evict_over_limit(&self, user_id: Uuid) -> CoreResult<Vec<Session>> {
        // Newest-first; anything past the limit is the oldest tail.
        let active = self.repo.list_active(user_id).await?;
        let mut evicted = Vec::new();
        if active.len() > self.max_sessions_per_user as usize {
            for stale in &active[self.max_sessions_per_user as usize..] {
                self.repo.invalidate(stale.id).await?;
                debug!(
                    session_id = %stale.id,
                    user_id = %user_id,
                    "Evicted oldest session over per-user limit"
                );
                evicted.push(stale.clone());
            }
        }
        Ok(evicted)
    }

    /// Active sessions, newest-first.
    pub async fn list_active(&self, user_id: Uuid) -> CoreResult<Vec<Session>> {
        self.repo.list_active(user_id).await
    }

    pub async fn get_by_token_hash(&self, token_hash: &str) -> CoreResult<Session> {
        self.repo.get_by_token_hash(token_hash).await
    }

    pub async fn get_by_id(&self, session_id: Uuid) -> CoreResult<Session> {
        self.repo.get_by_id(session_id).await
    }

    /// Update activity timestamp (and optionally IP). Safe to race with
    /// eviction — a concurrent invalidation wins and the touch is a
    /// no-op.
    pub async fn touch(&self, session_id: Uuid, ip_address: Option<String>) -> CoreResult<()> {
        self.repo.touch(session_id, ip_address).await
    }

    /// Replace the session's refresh token hash (rotation-on-refresh).
    pub async fn rotate_token(&self, session_id: Uuid, token_hash: String) -> CoreResult<()> {
        self.repo.rotate_token(session_id, token_hash).await
    }

    /// Mark a session inactive. Invalidating an already-inactive
    /// session is a no-op success.
    pub async fn invalidate(&self, session_id: Uuid, user_id: Uuid) -> CoreResult<()> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.repo.invalidate(session_id).await
    }

    /// Mark all of a user's sessions inactive, optionally sparing one
    /// (the caller's own). Returns the number invalidated.
    pub async fn invalidate_all(&self, user_id: Uuid, except: Option<Uuid>) -> CoreResult<u64> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.repo.invalidate_user_sessions(user_id, except).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

    use chrono::{Duration, Utc};
    use gatekey_core::error::CoreError;

    /// In-memory repository with a switchable failure on `list_active`.
    /// `created_at` is strictly increasing per insert so oldest-first
    /// ordering never ties.
    #[derive(Default)]
    struct StubSessionRepo {
        sessions: StdMutex<Vec<Session>>,
        fail_list_active: AtomicBool,
        seq: AtomicI64,
    }

    impl SessionRepository for StubSessionRepo {
        async fn create(&self, input: CreateSession) -> CoreResult<Session> {
            let seq = self.seq.fetch_add(1, Ordering::SeqCst);
            let now = Utc::now() + Duration::microseconds(seq);
            let session = Session {
                id: Uuid::new_v4(),
                user_id: input.user_id,
                refresh_token_hash: input.refresh_token_hash,
                device_fingerprint: input.device_fingerprint,
                device_label: input.device_label,
                ip_address: input.ip_address,
                active: true,
                expires_at: input.expires_at,
                created_at: now,
                last_activity_at: now,
            };
            self.sessions.lock().unwrap().push(session.clone());
            Ok(session)
        }

        async fn get_by_id(&self, id: Uuid) -> CoreResult<Session> {
            self.sessions
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.id == id)
                .cloned()
                .ok_or_else(|| CoreError::NotFound {
                    entity: "session".into(),
                    id: id.to_string(),
                })
        }

        async fn get_by_token_hash(&self, token_hash: &str) -> CoreResult<Session> {
            self.sessions
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.refresh_token_hash == token_hash)
                .cloned()
                .ok_or_else(|| CoreError::NotFound {
                    entity: "session".into(),
                    id: format!("token_hash={token_hash}"),
                })
        }

        async fn list_active(&self, user_id: Uuid) -> CoreResult<Vec<Session>> {
            if self.fail_list_active.load(Ordering::SeqCst) {
                return Err(CoreError::Database("list_active failed".into()));
            }
            let mut active: Vec<Session> = self
                .sessions
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.user_id == user_id && s.active)
                .cloned()
                .collect();
            active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(active)
        }

        async fn touch(&self, _id: Uuid, _ip_address: Option<String>) -> CoreResult<()> {
            Ok(())
        }

        async fn rotate_token(&self, _id: Uuid, _token_hash: String) -> CoreResult<()> {
            Ok(())
        }

        async fn invalidate(&self, id: Uuid) -> CoreResult<()> {
            for s in self.sessions.lock().unwrap().iter_mut() {
                if s.id == id {
                    s.active = false;
                }
            }
            Ok(())
        }

        async fn invalidate_user_sessions(
            &self,
            user_id: Uuid,
            except: Option<Uuid>,
        ) -> CoreResult<u64> {
            let mut count = 0;
            for s in self.sessions.lock().unwrap().iter_mut() {
                if s.user_id == user_id && s.active && Some(s.id) != except {
                    s.active = false;
                    count += 1;
                }
            }
            Ok(count)
        }
    }

    fn new_session(user_id: Uuid, token_hash: &str) -> CreateSession {
        CreateSession {
            user_id,
            refresh_token_hash: token_hash.into(),
            device_fingerprint: "fp-test".into(),
            device_label: None,
            ip_address: None,
            expires_at: Utc::now() + Duration::days(7),
        }
    }

    #[tokio::test]
    async fn register_evicts_oldest_past_the_limit() {
        let store = SessionStore::new(StubSessionRepo::default(), 2);
        let user_id = Uuid::new_v4();

        let (first, evicted) = store.register(new_session(user_id, "h1")).await.unwrap();
        assert!(evicted.is_empty());
        store.register(new_session(user_id, "h2")).await.unwrap();
        let (_, evicted) = store.register(new_session(user_id, "h3")).await.unwrap();

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, first.id);
        assert_eq!(store.list_active(user_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_eviction_rolls_back_the_new_session() {
        let store = SessionStore::new(StubSessionRepo::default(), 2);
        let user_id = Uuid::new_v4();

        let (kept, _) = store.register(new_session(user_id, "h1")).await.unwrap();

        store.repo.fail_list_active.store(true, Ordering::SeqCst);
        let err = store.register(new_session(user_id, "h2")).await.unwrap_err();
        assert!(matches!(err, CoreError::Database(_)));
        store.repo.fail_list_active.store(false, Ordering::SeqCst);

        // The failed registration left no extra active session.
        let active = store.list_active(user_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, kept.id);
        // Its refresh token resolves to an inactive row, not a live one.
        let orphan = store.get_by_token_hash("h2").await.unwrap();
        assert!(!orphan.active);
    }
}
