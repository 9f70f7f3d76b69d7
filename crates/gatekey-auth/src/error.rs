//! Authentication error taxonomy.
//!
//! Every public flow returns one of these — never a storage error and
//! never a panic. `error_code` is the stable machine-readable code
//! callers branch on; the `Display` text is for logs.

use gatekey_core::error::CoreError;
use thiserror::Error;

use crate::policy::PolicyViolation;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed input — caller's fault, safe to show detail.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Generic credential failure. Deliberately does not say whether
    /// the email exists or which factor failed.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Federated assertion failed signature, expiry, audience, or
    /// issuer checks. Detail stays server-side.
    #[error("invalid federated assertion: {0}")]
    InvalidAssertion(String),

    /// Assertion email does not match the account being linked.
    #[error("assertion email does not match the expected address")]
    EmailMismatch,

    /// Removing this credential would leave the account with no way to
    /// sign in.
    #[error("account has no alternate authentication method")]
    NoAlternateAuth,

    #[error("a password is already set for this account")]
    PasswordAlreadyExists,

    #[error("password matches a recently used password")]
    PasswordReused,

    #[error("password does not meet policy requirements")]
    PolicyViolations(Vec<PolicyViolation>),

    /// Refresh token unknown or bound to a revoked/evicted session.
    #[error("refresh token is invalid")]
    RefreshInvalid,

    /// Refresh token's session expired naturally.
    #[error("refresh token has expired")]
    RefreshExpired,

    #[error("access token has expired")]
    TokenExpired,

    #[error("invalid access token: {0}")]
    TokenInvalid(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Identity provider or hashing backend unavailable.
    #[error("dependency failure: {0}")]
    Dependency(String),

    #[error("cryptography error: {0}")]
    Crypto(String),

    /// Unexpected internal fault (e.g. storage unreachable).
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code for API surfaces.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "VALIDATION",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::InvalidAssertion(_) => "INVALID_ASSERTION",
            AuthError::EmailMismatch => "EMAIL_MISMATCH",
            AuthError::NoAlternateAuth => "NO_ALTERNATE_AUTH",
            AuthError::PasswordAlreadyExists => "PASSWORD_ALREADY_EXISTS",
            AuthError::PasswordReused => "PASSWORD_REUSED",
            AuthError::PolicyViolations(_) => "PASSWORD_POLICY",
            AuthError::RefreshInvalid => "REFRESH_INVALID",
            AuthError::RefreshExpired => "REFRESH_EXPIRED",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenInvalid(_) => "TOKEN_INVALID",
            AuthError::RateLimited { .. } => "RATE_LIMITED",
            AuthError::Dependency(_) => "DEPENDENCY",
            AuthError::Crypto(_) => "CRYPTO",
            AuthError::Internal(_) => "INTERNAL",
        }
    }
}

/// Storage faults surface as internal errors — callers must never be
/// able to confuse an unreachable database with a bad password.
impl From<CoreError> for AuthError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Crypto(msg) => AuthError::Crypto(msg),
            other => AuthError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AuthError::InvalidCredentials.error_code(), "INVALID_CREDENTIALS");
        assert_eq!(AuthError::RefreshInvalid.error_code(), "REFRESH_INVALID");
        assert_eq!(AuthError::RefreshExpired.error_code(), "REFRESH_EXPIRED");
        assert_eq!(
            AuthError::RateLimited {
                retry_after_secs: 30
            }
            .error_code(),
            "RATE_LIMITED"
        );
    }

    #[test]
    fn storage_faults_become_internal() {
        let err: AuthError = CoreError::Database("connection reset".into()).into();
        assert_eq!(err.error_code(), "INTERNAL");
    }
}
