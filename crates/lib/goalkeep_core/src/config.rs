//! Credential configuration: signing key, issuer, lifetimes, lockout.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{info, warn};

use crate::auth::password::{DEFAULT_ITERATIONS, PasswordHasher};

/// Session token lifetime: 5 minutes.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 5 * 60;

/// Access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

/// Refresh token lifetime: 30 days.
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Failed logins allowed before the account locks.
pub const DEFAULT_MAX_FAILED_LOGINS: i32 = 5;

/// How long a lock lasts.
pub const DEFAULT_LOCKOUT_SECS: i64 = 15 * 60;

pub const DEFAULT_ISSUER: &str = "goalkeep";

/// Upper bound accepted for any lifetime or lockout setting: one year.
pub const MAX_TTL_SECS: i64 = 366 * 24 * 60 * 60;

/// Settings shared by token issuance, verification and login.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// HMAC signing key for bearer tokens.
    pub signing_key: String,
    /// `iss` claim written and required on verification.
    pub issuer: String,
    pub session_ttl_secs: i64,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub max_failed_logins: i32,
    pub lockout_secs: i64,
    pub password_iterations: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_key: String::new(),
            issuer: DEFAULT_ISSUER.to_string(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
            max_failed_logins: DEFAULT_MAX_FAILED_LOGINS,
            lockout_secs: DEFAULT_LOCKOUT_SECS,
            password_iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl AuthConfig {
    /// Config with the given key and every other field defaulted.
    pub fn with_signing_key(signing_key: impl Into<String>) -> Self {
        Self {
            signing_key: signing_key.into(),
            ..Self::default()
        }
    }

    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                  | Default                         |
    /// |---------------------------|---------------------------------|
    /// | `JWT_KEY` / `AUTH_SECRET` | generated & persisted to file   |
    /// | `JWT_ISSUER`              | `goalkeep`                      |
    /// | `SESSION_TOKEN_TTL_SECS`  | `300`                           |
    /// | `ACCESS_TOKEN_TTL_SECS`   | `900`                           |
    /// | `REFRESH_TOKEN_TTL_SECS`  | `2592000`                       |
    /// | `MAX_FAILED_LOGINS`       | `5`                             |
    /// | `LOCKOUT_SECS`            | `900`                           |
    /// | `PASSWORD_ITERATIONS`     | `100000` (never lower)          |
    ///
    /// Lifetimes and the lockout must lie in `1..=MAX_TTL_SECS` and the
    /// failed-login limit must be positive; anything else falls back to the
    /// default with a warning.
    pub fn from_env() -> Self {
        Self {
            signing_key: resolve_signing_key(),
            issuer: std::env::var("JWT_ISSUER")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_ISSUER.into()),
            session_ttl_secs: ttl_or("SESSION_TOKEN_TTL_SECS", DEFAULT_SESSION_TTL_SECS),
            access_ttl_secs: ttl_or("ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl_secs: ttl_or("REFRESH_TOKEN_TTL_SECS", DEFAULT_REFRESH_TTL_SECS),
            max_failed_logins: env_in("MAX_FAILED_LOGINS", DEFAULT_MAX_FAILED_LOGINS, 1..=i32::MAX),
            lockout_secs: ttl_or("LOCKOUT_SECS", DEFAULT_LOCKOUT_SECS),
            password_iterations: env_or("PASSWORD_ITERATIONS", DEFAULT_ITERATIONS)
                .max(DEFAULT_ITERATIONS),
        }
    }

    /// Hasher configured with this config's iteration count.
    pub fn password_hasher(&self) -> PasswordHasher {
        PasswordHasher::with_iterations(self.password_iterations)
    }
}

fn env_or<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    parse_or(name, std::env::var(name).ok().as_deref(), default)
}

fn ttl_or(name: &str, default: i64) -> i64 {
    env_in(name, default, 1..=MAX_TTL_SECS)
}

fn env_in<T: FromStr + Copy + PartialOrd + std::fmt::Display>(
    name: &str,
    default: T,
    range: RangeInclusive<T>,
) -> T {
    bounded_or(name, std::env::var(name).ok().as_deref(), default, range)
}

fn bounded_or<T: FromStr + Copy + PartialOrd + std::fmt::Display>(
    name: &str,
    raw: Option<&str>,
    default: T,
    range: RangeInclusive<T>,
) -> T {
    let value = parse_or(name, raw, default);
    if range.contains(&value) {
        value
    } else {
        warn!(
            variable = name,
            %value,
            min = %range.start(),
            max = %range.end(),
            %default,
            "setting out of range, using default"
        );
        default
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(name: &str, raw: Option<&str>, default: T) -> T {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => default,
        Some(s) => s.parse().unwrap_or_else(|_| {
            warn!(variable = name, value = s, %default, "ignoring malformed setting");
            default
        }),
    }
}

/// Resolve the signing key: env var `JWT_KEY` → `AUTH_SECRET` → persisted file.
pub fn resolve_signing_key() -> String {
    for var in ["JWT_KEY", "AUTH_SECRET"] {
        if let Ok(key) = std::env::var(var)
            && !key.is_empty()
        {
            return key;
        }
    }
    let key_path = signing_key_path();
    if let Ok(existing) = std::fs::read_to_string(&key_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let key: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = key_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(&key_path, &key) {
        warn!(path = %key_path.display(), error = %e, "could not persist signing key; tokens will not survive a restart");
    } else {
        info!(path = %key_path.display(), "generated new signing key");
    }
    key
}

/// Path to the persisted signing key file.
fn signing_key_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("goalkeep")
        .join("jwt-key")
}
