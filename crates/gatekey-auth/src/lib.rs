//! GATEKEY Auth — credential verification, token issuance, bounded
//! session registry, account linking, and the orchestrating service.

pub mod config;
pub mod error;
pub mod federation;
pub mod linker;
pub mod notify;
pub mod password;
pub mod policy;
pub mod rate_limit;
pub mod service;
pub mod store;
pub mod token;

pub use config::AuthConfig;
pub use error::AuthError;
pub use federation::{AssertionVerifier, FederatedAssertionClaims, JwtAssertionVerifier};
pub use linker::{AccountLinker, LinkOutcome};
pub use service::{AuthService, DeviceInfo, LoginInput, LoginOutput};
pub use store::SessionStore;
pub use token::AccessTokenClaims;
