//! Authentication service — the façade composing credential
//! verification, token issuance, the session registry, and account
//! linking into the public flows.
//!
//! Every flow returns a tagged [`AuthError`] rather than panicking or
//! leaking storage errors. Credential failures are deliberately
//! uniform: login reports `INVALID_CREDENTIALS` whether the email was
//! unknown, the account inactive, federated-only, or the password
//! wrong — no account-enumeration signal.
//!
//! Ordering rules: password hashing happens before any per-user session
//! lock is taken, and collaborator calls (notification, audit) happen
//! strictly after the authoritative state transition commits.

use std::sync::Arc;

use chrono::{Duration, Utc};
use gatekey_core::collaborators::{AuditSink, Notifier};
use gatekey_core::error::CoreError;
use gatekey_core::models::audit::AuditEvent;
use gatekey_core::models::password_history::CreatePasswordHistoryEntry;
use gatekey_core::models::session::{CreateSession, Session};
use gatekey_core::models::user::{CreateUser, Role, UpdateUser, User};
use gatekey_core::repository::{PasswordHistoryRepository, SessionRepository, UserRepository};
use tracing::warn;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::federation::AssertionVerifier;
use crate::linker::AccountLinker;
use crate::password;
use crate::policy;
use crate::rate_limit::{LoginRateLimiter, RateLimitConfig};
use crate::store::SessionStore;
use crate::token;

/// Client signals describing the device a session binds to.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Opaque fingerprint derived from client signals.
    pub fingerprint: String,
    /// Human-readable device name, best-effort.
    pub label: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Redacted user representation returned to callers — never carries the
/// password hash.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub email_verified: bool,
    pub role: Role,
    pub has_password: bool,
    pub has_federated_identity: bool,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            email_verified: user.email_verified,
            role: user.role,
            has_password: user.password_hash.is_some(),
            has_federated_identity: user.federated_id.is_some(),
        }
    }
}

/// Session representation returned to callers — no token hash.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub id: Uuid,
    pub device_fingerprint: String,
    pub device_label: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub last_activity_at: chrono::DateTime<Utc>,
}

impl From<Session> for SessionView {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            device_fingerprint: s.device_fingerprint,
            device_label: s.device_label,
            ip_address: s.ip_address,
            created_at: s.created_at,
            last_activity_at: s.last_activity_at,
        }
    }
}

/// Input for the password login flow.
#[derive(Debug)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub device: DeviceInfo,
}

/// Successful login result.
#[derive(Debug)]
pub struct LoginOutput {
    pub user: UserProfile,
    /// Signed JWT access token.
    pub access_token: String,
    /// Raw opaque refresh token (return to client, not stored).
    pub refresh_token: String,
    /// Session ID (can be used for logout).
    pub session_id: Uuid,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Successful federated login result.
#[derive(Debug)]
pub struct FederatedLoginOutput {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
    pub expires_in: u64,
    /// True when this assertion created the account — callers use it to
    /// trigger welcome flows.
    pub is_new_user: bool,
}

/// Successful refresh result.
#[derive(Debug)]
pub struct RefreshOutput {
    /// New signed JWT access token.
    pub access_token: String,
    /// Replacement refresh token — present only when rotation is
    /// configured; otherwise the presented token stays valid.
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

/// Result of a password change.
#[derive(Debug)]
pub struct ChangePasswordOutput {
    /// How many *other* sessions were signed out.
    pub sessions_invalidated: u64,
}

/// Authentication service.
///
/// Generic over repository and verifier implementations so the auth
/// layer has no dependency on the database crate or a live identity
/// provider.
pub struct AuthService<U, S, P, V>
where
    U: UserRepository + Clone,
    S: SessionRepository,
    P: PasswordHistoryRepository,
    V: AssertionVerifier,
{
    users: U,
    sessions: SessionStore<S>,
    history: P,
    verifier: V,
    linker: AccountLinker<U>,
    limiter: LoginRateLimiter,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    config: AuthConfig,
}

impl<U, S, P, V> AuthService<U, S, P, V>
where
    U: UserRepository + Clone,
    S: SessionRepository,
    P: PasswordHistoryRepository,
    V: AssertionVerifier,
{
    pub fn new(
        users: U,
        session_repo: S,
        history: P,
        verifier: V,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
        config: AuthConfig,
    ) -> Self {
        let linker = AccountLinker::new(users.clone());
        let sessions = SessionStore::new(session_repo, config.max_sessions_per_user);
        let limiter = LoginRateLimiter::in_memory(RateLimitConfig {
            max_attempts: config.rate_limit_max_attempts,
            window_secs: config.rate_limit_window_secs,
        });
        Self {
            users,
            sessions,
            history,
            verifier,
            linker,
            limiter,
            notifier,
            audit,
            config,
        }
    }

    /// Replace the default in-memory rate limiter (e.g. with one backed
    /// by a shared store).
    pub fn with_rate_limiter(mut self, limiter: LoginRateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    // -------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------

    /// Create a password account.
    pub async fn register(
        &self,
        email: &str,
        new_password: &str,
        display_name: Option<String>,
    ) -> Result<UserProfile, AuthError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::Validation("invalid email address".into()));
        }

        policy::validate(new_password).into_result()?;

        match self.users.get_by_email(&email).await {
            Ok(_) => {
                return Err(AuthError::Validation(
                    "email address is already registered".into(),
                ));
            }
            Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let hash = password::hash_password(new_password, self.config.pepper.as_deref())?;
        let user = self
            .users
            .create(CreateUser {
                email,
                password_hash: Some(hash.clone()),
                federated_id: None,
                display_name,
                email_verified: false,
                role: Role::Member,
            })
            .await?;

        self.record_history(user.id, hash).await?;
        self.record_audit(Some(user.id), "register", true, None).await;

        Ok(UserProfile::from(&user))
    }

    // -------------------------------------------------------------------
    // Login flows
    // -------------------------------------------------------------------

    /// Authenticate with email + password and issue a token pair.
    pub async fn login(&self, input: LoginInput) -> Result<LoginOutput, AuthError> {
        let email = input.email.trim().to_lowercase();

        // 1. Rate limit gate, keyed by the (lowercased) email.
        self.limiter.check(&email)?;

        // 2. Look up the account. Every rejection from here to the
        //    password check is the same generic error.
        let user = match self.users.get_by_email(&email).await {
            Ok(user) => user,
            Err(CoreError::NotFound { .. }) => {
                self.limiter.record_failure(&email);
                self.record_audit(None, "login", false, Some(&input.device))
                    .await;
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        // 3. Verify the password — CPU-bound, done before any session
        //    lock is taken. Accounts without a password (federated-only)
        //    verify as false, never as an error.
        let verified = match &user.password_hash {
            Some(hash) => password::verify_password(
                &input.password,
                hash,
                self.config.pepper.as_deref(),
            )?,
            None => false,
        };

        if !verified || !user.active {
            self.limiter.record_failure(&email);
            self.record_audit(Some(user.id), "login", false, Some(&input.device))
                .await;
            return Err(AuthError::InvalidCredentials);
        }

        self.limiter.reset(&email);

        // 4. Mint the token pair and register the session (evicting the
        //    oldest if the user is at the limit).
        let (output, _) = self.establish_session(&user, &input.device).await?;

        // 5. Best-effort bookkeeping + collaborators, after commit.
        if let Err(e) = self
            .users
            .update(
                user.id,
                UpdateUser {
                    last_login_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
        {
            warn!(user_id = %user.id, error = %e, "Failed to bump last_login_at");
        }

        self.record_audit(Some(user.id), "login", true, Some(&input.device))
            .await;
        self.notifier
            .new_session(
                &user.email,
                input.device.label.as_deref(),
                input.device.ip_address.as_deref(),
            )
            .await;

        Ok(output)
    }

    /// Authenticate with a federated assertion, linking or creating an
    /// account as needed.
    pub async fn login_federated(
        &self,
        raw_assertion: &str,
        device: DeviceInfo,
    ) -> Result<FederatedLoginOutput, AuthError> {
        // 1. Verify the assertion — fails closed on any provider error.
        let claims = self.verifier.verify(raw_assertion).await?;

        // 2. Reconcile with local accounts. The linker rejects a
        //    deactivated account before any link or create write.
        let outcome = match self.linker.authenticate_federated(&claims).await {
            Ok(outcome) => outcome,
            Err(err @ AuthError::InvalidCredentials) => {
                self.record_audit(None, "login_federated", false, Some(&device))
                    .await;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        // 3. Issue tokens + session.
        let (output, _) = self.establish_session(&outcome.user, &device).await?;

        self.record_audit(Some(outcome.user.id), "login_federated", true, Some(&device))
            .await;
        self.notifier
            .new_session(
                &outcome.user.email,
                device.label.as_deref(),
                device.ip_address.as_deref(),
            )
            .await;
        if outcome.linked {
            self.notifier.account_linked(&outcome.user.email).await;
        }

        Ok(FederatedLoginOutput {
            user: output.user,
            access_token: output.access_token,
            refresh_token: output.refresh_token,
            session_id: output.session_id,
            expires_in: output.expires_in,
            is_new_user: outcome.is_new_user,
        })
    }

    // -------------------------------------------------------------------
    // Refresh / logout
    // -------------------------------------------------------------------

    /// Exchange a refresh token for a fresh access token.
    ///
    /// The refresh token is not rotated unless `rotate_refresh_tokens`
    /// is configured. Revoked or evicted sessions answer
    /// `REFRESH_INVALID`; natural expiry answers `REFRESH_EXPIRED`.
    pub async fn refresh(&self, raw_refresh_token: &str) -> Result<RefreshOutput, AuthError> {
        // 1. Point read by token hash.
        let token_hash = token::hash_refresh_token(raw_refresh_token);
        let session = match self.sessions.get_by_token_hash(&token_hash).await {
            Ok(session) => session,
            Err(CoreError::NotFound { .. }) => {
                self.record_audit(None, "refresh", false, None).await;
                return Err(AuthError::RefreshInvalid);
            }
            Err(e) => return Err(e.into()),
        };

        // 2. Revoked/evicted before expired — the distinction matters
        //    for audit clarity even though both are terminal.
        if !session.active {
            self.record_audit(Some(session.user_id), "refresh", false, None)
                .await;
            return Err(AuthError::RefreshInvalid);
        }
        if session.expires_at <= Utc::now() {
            self.sessions.invalidate(session.id, session.user_id).await?;
            self.record_audit(Some(session.user_id), "refresh", false, None)
                .await;
            return Err(AuthError::RefreshExpired);
        }

        // 3. The owner must still be a live account.
        let user = match self.users.get_by_id(session.user_id).await {
            Ok(user) if user.active => user,
            Ok(_) | Err(CoreError::NotFound { .. }) => {
                self.record_audit(Some(session.user_id), "refresh", false, None)
                    .await;
                return Err(AuthError::RefreshInvalid);
            }
            Err(e) => return Err(e.into()),
        };

        // 4. Re-sign a fresh access token; rotate only if configured.
        let access_token = token::issue_access_token(&user, &self.config)?;

        let rotated = if self.config.rotate_refresh_tokens {
            let raw = token::generate_refresh_token();
            self.sessions
                .rotate_token(session.id, token::hash_refresh_token(&raw))
                .await?;
            Some(raw)
        } else {
            None
        };

        self.sessions.touch(session.id, None).await?;
        self.record_audit(Some(user.id), "refresh", true, None).await;

        Ok(RefreshOutput {
            access_token,
            refresh_token: rotated,
            expires_in: self.config.access_token_lifetime_secs,
        })
    }

    /// Sign out the session behind a refresh token, or every session
    /// for its owner.
    pub async fn logout(&self, raw_refresh_token: &str, all_devices: bool) -> Result<(), AuthError> {
        let token_hash = token::hash_refresh_token(raw_refresh_token);
        let session = match self.sessions.get_by_token_hash(&token_hash).await {
            Ok(session) => session,
            Err(CoreError::NotFound { .. }) => {
                self.record_audit(None, "logout", false, None).await;
                return Err(AuthError::RefreshInvalid);
            }
            Err(e) => return Err(e.into()),
        };

        // Invalidation is idempotent — logging out twice is a success.
        if all_devices {
            self.sessions.invalidate_all(session.user_id, None).await?;
            self.record_audit(Some(session.user_id), "logout_all", true, None)
                .await;
        } else {
            self.sessions.invalidate(session.id, session.user_id).await?;
            self.record_audit(Some(session.user_id), "logout", true, None)
                .await;
        }

        Ok(())
    }

    // -------------------------------------------------------------------
    // Session management
    // -------------------------------------------------------------------

    /// Active sessions for a user, newest-first.
    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<SessionView>, AuthError> {
        let sessions = self.sessions.list_active(user_id).await?;
        Ok(sessions.into_iter().map(SessionView::from).collect())
    }

    /// Invalidate one of the user's own sessions. Idempotent.
    pub async fn invalidate_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<(), AuthError> {
        let session = match self.sessions.get_by_id(session_id).await {
            Ok(session) => session,
            // Unknown and not-owned collapse to the same answer — no
            // probe for other users' session IDs.
            Err(CoreError::NotFound { .. }) => {
                return Err(AuthError::Validation("unknown session".into()));
            }
            Err(e) => return Err(e.into()),
        };
        if session.user_id != user_id {
            return Err(AuthError::Validation("unknown session".into()));
        }

        self.sessions.invalidate(session_id, user_id).await?;
        self.record_audit(Some(user_id), "session_invalidate", true, None)
            .await;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Password management
    // -------------------------------------------------------------------

    /// Change an existing password.
    ///
    /// The caller's own session survives when `invalidate_others` is
    /// set; the caller must supply that session's ID explicitly —
    /// identity is never inferred from ambient request state.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
        invalidate_others: bool,
        current_session_id: Option<Uuid>,
    ) -> Result<ChangePasswordOutput, AuthError> {
        let user = self.users.get_by_id(user_id).await?;

        // 1. Confirm the current password. An account without one
        //    verifies as false — same generic rejection.
        let verified = match &user.password_hash {
            Some(hash) => {
                password::verify_password(current_password, hash, self.config.pepper.as_deref())?
            }
            None => false,
        };
        if !verified {
            self.record_audit(Some(user_id), "password_change", false, None)
                .await;
            return Err(AuthError::InvalidCredentials);
        }

        // 2. Policy + history.
        self.check_new_password(user_id, new_password).await?;

        // 3. Persist the new hash, then the history entry.
        let new_hash = password::hash_password(new_password, self.config.pepper.as_deref())?;
        self.users
            .update(
                user_id,
                UpdateUser {
                    password_hash: Some(Some(new_hash.clone())),
                    ..Default::default()
                },
            )
            .await?;
        self.record_history(user_id, new_hash).await?;

        // 4. Optionally sign out every other device.
        let sessions_invalidated = if invalidate_others {
            self.sessions
                .invalidate_all(user_id, current_session_id)
                .await?
        } else {
            0
        };

        self.record_audit(Some(user_id), "password_change", true, None)
            .await;
        self.notifier.password_changed(&user.email).await;

        Ok(ChangePasswordOutput {
            sessions_invalidated,
        })
    }

    /// Set a password on a federated-only account.
    pub async fn set_password(&self, user_id: Uuid, new_password: &str) -> Result<(), AuthError> {
        let user = self.users.get_by_id(user_id).await?;
        if user.password_hash.is_some() {
            return Err(AuthError::PasswordAlreadyExists);
        }

        self.check_new_password(user_id, new_password).await?;

        let new_hash = password::hash_password(new_password, self.config.pepper.as_deref())?;
        self.users
            .update(
                user_id,
                UpdateUser {
                    password_hash: Some(Some(new_hash.clone())),
                    ..Default::default()
                },
            )
            .await?;
        self.record_history(user_id, new_hash).await?;

        self.record_audit(Some(user_id), "password_set", true, None)
            .await;
        self.notifier.password_changed(&user.email).await;
        Ok(())
    }

    /// Remove the password from an account that also has a federated
    /// identity. Mass-revokes every session.
    pub async fn remove_password(&self, user_id: Uuid) -> Result<(), AuthError> {
        let user = self.users.get_by_id(user_id).await?;
        if user.federated_id.is_none() {
            return Err(AuthError::NoAlternateAuth);
        }

        self.users
            .update(
                user_id,
                UpdateUser {
                    password_hash: Some(None),
                    ..Default::default()
                },
            )
            .await?;

        // A credential was removed; everything signed in with it goes.
        self.sessions.invalidate_all(user_id, None).await?;

        self.record_audit(Some(user_id), "password_remove", true, None)
            .await;
        self.notifier.password_changed(&user.email).await;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Federated identity management
    // -------------------------------------------------------------------

    /// Attach a federated identity to an existing account. The
    /// assertion's email must match the account's own email.
    pub async fn link_federated(
        &self,
        user_id: Uuid,
        raw_assertion: &str,
    ) -> Result<UserProfile, AuthError> {
        let claims = self.verifier.verify(raw_assertion).await?;
        let user = self.users.get_by_id(user_id).await?;

        let linked = match self.linker.link_explicit(user_id, &claims, &user.email).await {
            Ok(user) => user,
            Err(e) => {
                self.record_audit(Some(user_id), "link", false, None).await;
                return Err(e);
            }
        };

        self.record_audit(Some(user_id), "link", true, None).await;
        self.notifier.account_linked(&linked.email).await;
        Ok(UserProfile::from(&linked))
    }

    /// Detach the federated identity. Sessions are left alone.
    pub async fn unlink_federated(&self, user_id: Uuid) -> Result<UserProfile, AuthError> {
        let user = match self.linker.unlink(user_id).await {
            Ok(user) => user,
            Err(e) => {
                self.record_audit(Some(user_id), "unlink", false, None).await;
                return Err(e);
            }
        };

        self.record_audit(Some(user_id), "unlink", true, None).await;
        self.notifier.account_unlinked(&user.email).await;
        Ok(UserProfile::from(&user))
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    /// Mint a token pair and register the session. Returns the evicted
    /// sessions alongside for callers that care.
    async fn establish_session(
        &self,
        user: &User,
        device: &DeviceInfo,
    ) -> Result<(LoginOutput, Vec<Session>), AuthError> {
        let raw_refresh = token::generate_refresh_token();
        let token_hash = token::hash_refresh_token(&raw_refresh);
        let expires_at =
            Utc::now() + Duration::seconds(self.config.refresh_token_lifetime_secs as i64);

        let access_token = token::issue_access_token(user, &self.config)?;

        let (session, evicted) = self
            .sessions
            .register(CreateSession {
                user_id: user.id,
                refresh_token_hash: token_hash,
                device_fingerprint: device.fingerprint.clone(),
                device_label: device.label.clone(),
                ip_address: device.ip_address.clone(),
                expires_at,
            })
            .await?;

        Ok((
            LoginOutput {
                user: UserProfile::from(user),
                access_token,
                refresh_token: raw_refresh,
                session_id: session.id,
                expires_in: self.config.access_token_lifetime_secs,
            },
            evicted,
        ))
    }

    /// Policy + reuse gate for any new password.
    async fn check_new_password(&self, user_id: Uuid, candidate: &str) -> Result<(), AuthError> {
        policy::validate(candidate).into_result()?;

        let recent = self
            .history
            .list_recent(user_id, self.config.password_history_limit)
            .await?;
        let hashes: Vec<String> = recent.into_iter().map(|e| e.password_hash).collect();
        if policy::is_reused(candidate, &hashes, self.config.pepper.as_deref())? {
            return Err(AuthError::PasswordReused);
        }
        Ok(())
    }

    /// Append a history entry and prune to the retention limit.
    async fn record_history(&self, user_id: Uuid, password_hash: String) -> Result<(), AuthError> {
        self.history
            .append(CreatePasswordHistoryEntry {
                user_id,
                password_hash,
            })
            .await?;
        self.history
            .prune(user_id, self.config.password_history_limit)
            .await?;
        Ok(())
    }

    /// Emit an audit event. Sink failures are the sink's problem — this
    /// never fails the flow.
    async fn record_audit(
        &self,
        user_id: Option<Uuid>,
        action: &str,
        success: bool,
        device: Option<&DeviceInfo>,
    ) {
        let event = AuditEvent::new(user_id, action, success).with_context(
            device.and_then(|d| d.ip_address.clone()),
            device.and_then(|d| d.user_agent.clone()),
        );
        self.audit.record(event).await;
    }
}
