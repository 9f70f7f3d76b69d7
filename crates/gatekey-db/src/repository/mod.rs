//! SurrealDB repository implementations.

mod password_history;
mod session;
mod user;

pub use password_history::SurrealPasswordHistoryRepository;
pub use session::SurrealSessionRepository;
pub use user::SurrealUserRepository;
