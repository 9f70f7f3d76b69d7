//! GATEKEY Core — domain models, repository traits, and collaborator
//! interfaces shared across the authentication subsystem.

pub mod collaborators;
pub mod error;
pub mod models;
pub mod repository;
