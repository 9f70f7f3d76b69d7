//! Domain models for GATEKEY.
//!
//! These are the core types shared across all crates.

pub mod audit;
pub mod password_history;
pub mod session;
pub mod user;
