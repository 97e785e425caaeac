//! Business logic bridging handlers and `goalkeep_core`.

pub mod auth;
