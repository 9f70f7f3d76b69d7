//! Repository tests against an in-memory SurrealDB.

use chrono::{Duration, Utc};
use gatekey_core::error::CoreError;
use gatekey_core::models::password_history::CreatePasswordHistoryEntry;
use gatekey_core::models::session::CreateSession;
use gatekey_core::models::user::{CreateUser, Role, UpdateUser};
use gatekey_core::repository::{PasswordHistoryRepository, SessionRepository, UserRepository};
use gatekey_db::repository::{
    SurrealPasswordHistoryRepository, SurrealSessionRepository, SurrealUserRepository,
};
use gatekey_db::run_migrations;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    run_migrations(&db).await.unwrap();
    db
}

fn new_user(email: &str) -> CreateUser {
    CreateUser {
        email: email.into(),
        password_hash: Some("$argon2id$placeholder".into()),
        federated_id: None,
        display_name: Some("Alice".into()),
        email_verified: false,
        role: Role::Member,
    }
}

fn new_session(user_id: Uuid, token_hash: &str) -> CreateSession {
    CreateSession {
        user_id,
        refresh_token_hash: token_hash.into(),
        device_fingerprint: "fp-test".into(),
        device_label: Some("laptop".into()),
        ip_address: Some("203.0.113.7".into()),
        expires_at: Utc::now() + Duration::days(7),
    }
}

// -----------------------------------------------------------------------
// Users
// -----------------------------------------------------------------------

#[tokio::test]
async fn user_roundtrip() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    let created = repo.create(new_user("alice@example.com")).await.unwrap();
    assert!(created.active);
    assert_eq!(created.role, Role::Member);

    let fetched = repo.get_by_id(created.id).await.unwrap();
    assert_eq!(fetched.email, "alice@example.com");
    assert_eq!(fetched.password_hash, created.password_hash);
}

#[tokio::test]
async fn email_lookup_is_case_insensitive() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    let created = repo.create(new_user("Alice@Example.COM")).await.unwrap();
    // Stored lowercased.
    assert_eq!(created.email, "alice@example.com");

    let fetched = repo.get_by_email("ALICE@example.com").await.unwrap();
    assert_eq!(fetched.id, created.id);
}

#[tokio::test]
async fn duplicate_email_hits_the_unique_index() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    repo.create(new_user("alice@example.com")).await.unwrap();
    let err = repo.create(new_user("Alice@example.com")).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    let err = repo.get_by_id(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
    let err = repo.get_by_email("nobody@example.com").await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[tokio::test]
async fn federated_id_lookup() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    let mut input = new_user("alice@example.com");
    input.federated_id = Some("subject-1".into());
    let created = repo.create(input).await.unwrap();

    let fetched = repo.get_by_federated_id("subject-1").await.unwrap();
    assert_eq!(fetched.id, created.id);

    let err = repo.get_by_federated_id("subject-2").await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[tokio::test]
async fn update_sets_and_clears_optional_fields() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);
    let created = repo.create(new_user("alice@example.com")).await.unwrap();

    // Attach a federated identity.
    let updated = repo
        .update(
            created.id,
            UpdateUser {
                federated_id: Some(Some("subject-1".into())),
                email_verified: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.federated_id.as_deref(), Some("subject-1"));
    assert!(updated.email_verified);
    // Untouched fields survive a partial update.
    assert_eq!(updated.password_hash, created.password_hash);

    // Clear it again with the explicit Some(None).
    let updated = repo
        .update(
            created.id,
            UpdateUser {
                federated_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.federated_id.is_none());
}

// -----------------------------------------------------------------------
// Sessions
// -----------------------------------------------------------------------

#[tokio::test]
async fn session_roundtrip_by_id_and_token_hash() {
    let db = setup().await;
    let repo = SurrealSessionRepository::new(db);
    let user_id = Uuid::new_v4();

    let created = repo.create(new_session(user_id, "hash-1")).await.unwrap();
    assert!(created.active);

    let by_id = repo.get_by_id(created.id).await.unwrap();
    assert_eq!(by_id.user_id, user_id);

    let by_hash = repo.get_by_token_hash("hash-1").await.unwrap();
    assert_eq!(by_hash.id, created.id);
}

#[tokio::test]
async fn list_active_is_newest_first_and_skips_inactive() {
    let db = setup().await;
    let repo = SurrealSessionRepository::new(db);
    let user_id = Uuid::new_v4();

    let s1 = repo.create(new_session(user_id, "hash-1")).await.unwrap();
    let s2 = repo.create(new_session(user_id, "hash-2")).await.unwrap();
    let s3 = repo.create(new_session(user_id, "hash-3")).await.unwrap();
    repo.invalidate(s2.id).await.unwrap();

    let active = repo.list_active(user_id).await.unwrap();
    let ids: Vec<_> = active.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![s3.id, s1.id]);
}

#[tokio::test]
async fn invalidated_session_still_resolves_by_hash() {
    let db = setup().await;
    let repo = SurrealSessionRepository::new(db);

    let created = repo
        .create(new_session(Uuid::new_v4(), "hash-1"))
        .await
        .unwrap();
    repo.invalidate(created.id).await.unwrap();

    // Soft invalidation: the row survives with active = false, so a
    // revoked token is distinguishable from an unknown one.
    let fetched = repo.get_by_token_hash("hash-1").await.unwrap();
    assert!(!fetched.active);

    // Idempotent.
    repo.invalidate(created.id).await.unwrap();
}

#[tokio::test]
async fn touch_updates_activity_but_never_resurrects() {
    let db = setup().await;
    let repo = SurrealSessionRepository::new(db);

    let created = repo
        .create(new_session(Uuid::new_v4(), "hash-1"))
        .await
        .unwrap();

    repo.touch(created.id, Some("198.51.100.2".into())).await.unwrap();
    let touched = repo.get_by_id(created.id).await.unwrap();
    assert!(touched.last_activity_at >= created.last_activity_at);
    assert_eq!(touched.ip_address.as_deref(), Some("198.51.100.2"));

    repo.invalidate(created.id).await.unwrap();
    repo.touch(created.id, Some("192.0.2.9".into())).await.unwrap();
    let after = repo.get_by_id(created.id).await.unwrap();
    assert!(!after.active);
    // The touch on the dead session wrote nothing.
    assert_eq!(after.ip_address.as_deref(), Some("198.51.100.2"));
}

#[tokio::test]
async fn rotate_token_swaps_the_hash() {
    let db = setup().await;
    let repo = SurrealSessionRepository::new(db);

    let created = repo
        .create(new_session(Uuid::new_v4(), "hash-old"))
        .await
        .unwrap();
    repo.rotate_token(created.id, "hash-new".into()).await.unwrap();

    assert!(matches!(
        repo.get_by_token_hash("hash-old").await.unwrap_err(),
        CoreError::NotFound { .. }
    ));
    let fetched = repo.get_by_token_hash("hash-new").await.unwrap();
    assert_eq!(fetched.id, created.id);
}

#[tokio::test]
async fn invalidate_user_sessions_counts_and_spares() {
    let db = setup().await;
    let repo = SurrealSessionRepository::new(db);
    let user_id = Uuid::new_v4();
    let other_user = Uuid::new_v4();

    let s1 = repo.create(new_session(user_id, "hash-1")).await.unwrap();
    repo.create(new_session(user_id, "hash-2")).await.unwrap();
    repo.create(new_session(user_id, "hash-3")).await.unwrap();
    repo.create(new_session(other_user, "hash-4")).await.unwrap();

    let count = repo
        .invalidate_user_sessions(user_id, Some(s1.id))
        .await
        .unwrap();
    assert_eq!(count, 2);

    let active = repo.list_active(user_id).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, s1.id);
    // The other user's session was never in scope.
    assert_eq!(repo.list_active(other_user).await.unwrap().len(), 1);

    // Second sweep finds nothing left to do.
    let count = repo.invalidate_user_sessions(user_id, None).await.unwrap();
    assert_eq!(count, 1);
    let count = repo.invalidate_user_sessions(user_id, None).await.unwrap();
    assert_eq!(count, 0);
}

// -----------------------------------------------------------------------
// Password history
// -----------------------------------------------------------------------

#[tokio::test]
async fn history_lists_newest_first_with_limit() {
    let db = setup().await;
    let repo = SurrealPasswordHistoryRepository::new(db);
    let user_id = Uuid::new_v4();

    for i in 1..=4 {
        repo.append(CreatePasswordHistoryEntry {
            user_id,
            password_hash: format!("hash-{i}"),
        })
        .await
        .unwrap();
    }

    let recent = repo.list_recent(user_id, 3).await.unwrap();
    let hashes: Vec<_> = recent.iter().map(|e| e.password_hash.as_str()).collect();
    assert_eq!(hashes, vec!["hash-4", "hash-3", "hash-2"]);
}

#[tokio::test]
async fn prune_keeps_only_the_newest() {
    let db = setup().await;
    let repo = SurrealPasswordHistoryRepository::new(db);
    let user_id = Uuid::new_v4();

    for i in 1..=5 {
        repo.append(CreatePasswordHistoryEntry {
            user_id,
            password_hash: format!("hash-{i}"),
        })
        .await
        .unwrap();
    }

    let removed = repo.prune(user_id, 2).await.unwrap();
    assert_eq!(removed, 3);

    let remaining = repo.list_recent(user_id, 10).await.unwrap();
    let hashes: Vec<_> = remaining.iter().map(|e| e.password_hash.as_str()).collect();
    assert_eq!(hashes, vec!["hash-5", "hash-4"]);

    // Nothing more to prune.
    assert_eq!(repo.prune(user_id, 2).await.unwrap(), 0);
}

#[tokio::test]
async fn history_is_scoped_per_user() {
    let db = setup().await;
    let repo = SurrealPasswordHistoryRepository::new(db);
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    repo.append(CreatePasswordHistoryEntry {
        user_id: alice,
        password_hash: "hash-a".into(),
    })
    .await
    .unwrap();
    repo.append(CreatePasswordHistoryEntry {
        user_id: bob,
        password_hash: "hash-b".into(),
    })
    .await
    .unwrap();

    let recent = repo.list_recent(alice, 10).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].password_hash, "hash-a");

    // Pruning Alice never touches Bob.
    repo.prune(alice, 0).await.unwrap();
    assert_eq!(repo.list_recent(bob, 10).await.unwrap().len(), 1);
}
