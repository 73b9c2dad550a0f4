//! Signed-token identity for clinic real-time connections.
//!
//! The CRUD login service signs an HS256 token carrying `{user_id, username, role}`.
//! This crate decodes and verifies it so the router can decide whether a
//! participant is authenticated without ever talking to the database.

pub mod claims;
pub mod error;
pub mod token;

pub use claims::{Claims, Role};
pub use error::AuthError;
pub use token::{DEFAULT_TOKEN_TTL_SECS, TokenVerifier};
