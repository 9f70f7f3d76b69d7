//! Federated identity ↔ local account reconciliation.
//!
//! Three cases, evaluated in order: the federated subject is already
//! bound to an account (plain login); an account exists with the same
//! email (link); neither (create). Linking treats the identity provider
//! as authoritative for email ownership, so `email_verified` is forced
//! on — the existing password hash, if any, is left untouched.

use chrono::Utc;
use gatekey_core::error::CoreError;
use gatekey_core::models::user::{CreateUser, Role, UpdateUser, User};
use gatekey_core::repository::UserRepository;
use tracing::info;

use crate::error::AuthError;
use crate::federation::FederatedAssertionClaims;

/// Result of reconciling a federated assertion with local accounts.
#[derive(Debug)]
pub struct LinkOutcome {
    pub user: User,
    /// A brand-new account was created for this assertion.
    pub is_new_user: bool,
    /// The assertion was attached to a pre-existing password account.
    pub linked: bool,
}

pub struct AccountLinker<U: UserRepository> {
    users: U,
}

impl<U: UserRepository> AccountLinker<U> {
    pub fn new(users: U) -> Self {
        Self { users }
    }

    /// Resolve a verified assertion to a local account, creating or
    /// linking as needed.
    ///
    /// A deactivated account answers `InvalidCredentials` with no
    /// write — not even `last_login_at` moves.
    pub async fn authenticate_federated(
        &self,
        claims: &FederatedAssertionClaims,
    ) -> Result<LinkOutcome, AuthError> {
        // Case (a): subject already bound — ordinary login.
        match self.users.get_by_federated_id(&claims.subject).await {
            Ok(user) => {
                if !user.active {
                    return Err(AuthError::InvalidCredentials);
                }
                let user = self
                    .users
                    .update(
                        user.id,
                        UpdateUser {
                            last_login_at: Some(Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await?;
                return Ok(LinkOutcome {
                    user,
                    is_new_user: false,
                    linked: false,
                });
            }
            Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        // Case (b): email collision — link onto the existing account.
        // A deactivated account is rejected before the link writes
        // anything.
        match self.users.get_by_email(&claims.email).await {
            Ok(user) => {
                if !user.active {
                    return Err(AuthError::InvalidCredentials);
                }
                let user = self
                    .users
                    .update(
                        user.id,
                        UpdateUser {
                            federated_id: Some(Some(claims.subject.clone())),
                            email_verified: Some(true),
                            last_login_at: Some(Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await?;
                info!(user_id = %user.id, "Linked federated identity to existing account");
                return Ok(LinkOutcome {
                    user,
                    is_new_user: false,
                    linked: true,
                });
            }
            Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        // Case (c): first sight — create a federated-only account.
        let user = self
            .users
            .create(CreateUser {
                email: claims.email.clone(),
                password_hash: None,
                federated_id: Some(claims.subject.clone()),
                display_name: claims.display_name.clone(),
                email_verified: true,
                role: Role::Member,
            })
            .await?;
        info!(user_id = %user.id, "Created account from federated identity");

        Ok(LinkOutcome {
            user,
            is_new_user: true,
            linked: false,
        })
    }

    /// Attach a federated identity to a specific account.
    ///
    /// The assertion's email must match `expected_email`
    /// (case-insensitively); a mismatch writes nothing. A subject
    /// already bound to a different account is likewise rejected
    /// without a write.
    pub async fn link_explicit(
        &self,
        user_id: uuid::Uuid,
        claims: &FederatedAssertionClaims,
        expected_email: &str,
    ) -> Result<User, AuthError> {
        if !claims.email.eq_ignore_ascii_case(expected_email.trim()) {
            return Err(AuthError::EmailMismatch);
        }

        match self.users.get_by_federated_id(&claims.subject).await {
            Ok(owner) if owner.id != user_id => {
                return Err(AuthError::Validation(
                    "federated identity is already linked to another account".into(),
                ));
            }
            Ok(_) | Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let user = self
            .users
            .update(
                user_id,
                UpdateUser {
                    federated_id: Some(Some(claims.subject.clone())),
                    email_verified: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        Ok(user)
    }

    /// Detach the federated identity from an account.
    ///
    /// Requires a password to remain — clearing the only credential
    /// would lock the account out. Does not revoke sessions; that is
    /// the caller's explicit choice.
    pub async fn unlink(&self, user_id: uuid::Uuid) -> Result<User, AuthError> {
        let user = self.users.get_by_id(user_id).await?;

        if user.password_hash.is_none() {
            return Err(AuthError::NoAlternateAuth);
        }

        let user = self
            .users
            .update(
                user_id,
                UpdateUser {
                    federated_id: Some(None),
                    ..Default::default()
                },
            )
            .await?;

        Ok(user)
    }
}
