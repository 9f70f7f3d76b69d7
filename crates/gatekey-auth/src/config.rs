//! Authentication configuration.

/// Configuration for the authentication service.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// PEM-encoded Ed25519 private key for JWT signing.
    pub jwt_private_key_pem: String,
    /// PEM-encoded Ed25519 public key for JWT verification.
    pub jwt_public_key_pem: String,
    /// Access token lifetime in seconds (default: 900 = 15 minutes).
    pub access_token_lifetime_secs: u64,
    /// Refresh token lifetime in seconds (default: 604_800 = 7 days).
    pub refresh_token_lifetime_secs: u64,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Optional pepper prepended to passwords before Argon2id hashing.
    pub pepper: Option<String>,
    /// Maximum active sessions per user; the oldest is evicted beyond
    /// this (default: 10).
    pub max_sessions_per_user: u32,
    /// Number of previous password hashes retained for reuse rejection
    /// (default: 5).
    pub password_history_limit: u32,
    /// Rotate the refresh token on every refresh (default: false — the
    /// presented token stays valid until logout or expiry).
    pub rotate_refresh_tokens: bool,
    /// Failed login attempts allowed per window before rate limiting
    /// (default: 10).
    pub rate_limit_max_attempts: u32,
    /// Rate limit window in seconds (default: 300 = 5 minutes).
    pub rate_limit_window_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_private_key_pem: String::new(),
            jwt_public_key_pem: String::new(),
            access_token_lifetime_secs: 900,
            refresh_token_lifetime_secs: 604_800,
            jwt_issuer: "gatekey".into(),
            pepper: None,
            max_sessions_per_user: 10,
            password_history_limit: 5,
            rotate_refresh_tokens: false,
            rate_limit_max_attempts: 10,
            rate_limit_window_secs: 300,
        }
    }
}
