//! Authentication and credential logic.
//!
//! Provides password hashing, token issuance, refresh-token rotation, the
//! two-layer resource authorization chain, and the login flow that ties them
//! together.

pub mod authorize;
pub mod jwt;
pub mod password;
pub mod refresh;
pub mod service;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Authentication and authorization errors.
///
/// Variants keep the precise cause for logging. Use
/// [`AuthError::public_message`] for anything shown to a caller.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is locked")]
    AccountLocked,

    #[error("Password not set")]
    PasswordNotSet,

    #[error("No usable profile: {0}")]
    NoProfile(String),

    #[error("Missing credential")]
    MissingCredential,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Token not found")]
    TokenNotFound,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Policy denied: {0}")]
    PolicyDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Outward message for this error.
    ///
    /// Credential and lookup failures collapse to one message so callers
    /// cannot enumerate accounts or token ids.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "Invalid email or password.",
            AuthError::AccountLocked => "Account is temporarily locked. Please try again later.",
            AuthError::PasswordNotSet => "Password not set. Please contact an administrator.",
            AuthError::NoProfile(_) => "No active programs found for this account.",
            AuthError::MissingCredential => "Credential is required.",
            AuthError::MalformedToken => "Invalid refresh token format.",
            AuthError::TokenNotFound => "Invalid refresh token.",
            AuthError::TokenExpired => "Refresh token has expired.",
            AuthError::TokenRevoked => "Refresh token has been revoked.",
            AuthError::InvalidRole(_) => "Operation failed.",
            AuthError::Unauthorized(_) => "Unauthorized.",
            AuthError::PolicyDenied(_) => "Forbidden.",
            AuthError::NotFound(_) => "Not found.",
            AuthError::Validation(_) => "Invalid request.",
            AuthError::DbError(_) | AuthError::Internal(_) => "Operation failed.",
        }
    }
}

/// `now + ttl_secs`, failing instead of overflowing on out-of-range lifetimes.
pub fn expiry_after(now: DateTime<Utc>, ttl_secs: i64) -> Result<DateTime<Utc>, AuthError> {
    Duration::try_seconds(ttl_secs)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| AuthError::Internal(format!("token lifetime out of range: {ttl_secs}s")))
}
