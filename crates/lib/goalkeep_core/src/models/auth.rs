//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API wire types in
//! `goalkeep_api::models` (which use camelCase and omit secrets).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stage marker carried by session tokens until a program is selected.
pub const STAGE_SELECTING_PROGRAM: &str = "selecting_program";

/// Domain user, including the credential columns needed by login.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub password_salt: Option<String>,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl User {
    /// Whether the account is locked at `now`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// One of a user's active program memberships, as listed after login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProgram {
    pub program_id: Uuid,
    pub program_name: String,
    pub role: String,
    pub role_display_name: String,
    pub is_primary: bool,
}

/// Membership status of a user within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Inactive,
}

impl MembershipStatus {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("active") {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

/// A user joined with one specific program membership.
#[derive(Debug, Clone)]
pub struct ProgramUser {
    pub user_id: Uuid,
    pub email: String,
    pub program_id: Uuid,
    pub program_name: String,
    pub role: String,
    pub role_display_name: String,
    pub status: MembershipStatus,
}

/// Refresh-token record as persisted by a [`crate::store::CredentialStore`].
///
/// The plaintext secret is never stored; only its PBKDF2 hash and salt.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub program_id: Uuid,
    pub token_hash: String,
    pub token_salt: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by_token_id: Option<Uuid>,
    pub device_info: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Input for creating a refresh-token record.
///
/// `expires_at` is computed from the application clock at mint time; stores
/// persist it as given.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub program_id: Uuid,
    pub token_hash: String,
    pub token_salt: String,
    pub expires_at: DateTime<Utc>,
    pub device_info: Option<String>,
    pub user_agent: Option<String>,
}

/// Caller metadata recorded alongside a refresh token.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientContext {
    /// JSON blob stored in the `device_info` column.
    pub fn device_info(&self) -> String {
        serde_json::json!({ "ip_address": self.ip_address }).to_string()
    }
}

/// JWT claims embedded in phase-1 session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: user ID.
    pub sub: String,
    pub email: String,
    /// Unique token identifier.
    pub jti: String,
    /// Always [`STAGE_SELECTING_PROGRAM`].
    pub auth_stage: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// JWT claims embedded in phase-2 access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: user ID.
    pub sub: String,
    pub email: String,
    pub jti: String,
    pub role: String,
    pub program_id: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated principal derived from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role: crate::policy::Role,
    pub program_id: Uuid,
}
