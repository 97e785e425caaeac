//! # goalkeep_core
//!
//! Credential issuance, refresh-token rotation and access-control decisions
//! for Goalkeep. Storage is reached only through the traits in [`store`].

pub mod auth;
pub mod config;
pub mod migrate;
pub mod models;
pub mod policy;
pub mod store;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
