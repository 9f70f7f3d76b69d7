//! GATEKEY Database — SurrealDB connection management, schema
//! migrations, and repository implementations for the authentication
//! subsystem.

mod connection;
mod error;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::run_migrations;
