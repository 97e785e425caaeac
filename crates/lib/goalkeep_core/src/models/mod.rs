//! Domain models shared across the auth, policy and store modules.

pub mod assignment;
pub mod auth;
