//! Refresh-token lifecycle: create, verify, rotate, revoke.
//!
//! The presented token is `{record_id}.{secret}`. Only a PBKDF2 hash of the
//! secret is stored. Each successful refresh revokes the presented record and
//! links it to a freshly created successor, so a token is good for exactly
//! one use. Expiry is checked at use time; nothing sweeps old records.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AuthError, expiry_after};
use super::password::PasswordHasher;
use crate::models::auth::{ClientContext, NewRefreshToken, RefreshTokenRecord};
use crate::store::CredentialStore;
use crate::uuid::uuidv7;

const SECRET_LEN: usize = 64;

/// A refresh token as handed to and presented by a client.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: Uuid,
    pub secret: String,
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshToken")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.id, self.secret)
    }
}

impl RefreshToken {
    /// Split a presented token at its first `.`.
    ///
    /// Fails with [`AuthError::MalformedToken`] when there is no separator,
    /// the id part is not a UUID, or the secret part is empty.
    pub fn parse(presented: &str) -> Result<Self, AuthError> {
        let (id, secret) = presented
            .trim()
            .split_once('.')
            .ok_or(AuthError::MalformedToken)?;
        let id = Uuid::parse_str(id).map_err(|_| AuthError::MalformedToken)?;
        if secret.is_empty() {
            return Err(AuthError::MalformedToken);
        }
        Ok(Self {
            id,
            secret: secret.to_string(),
        })
    }
}

/// Outcome of a logout-style revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revocation {
    Revoked,
    AlreadyRevoked,
}

/// Result of a successful rotation.
#[derive(Debug, Clone)]
pub struct Rotation {
    /// The new token to hand back to the client.
    pub token: RefreshToken,
    pub user_id: Uuid,
    pub program_id: Uuid,
}

/// Refresh-token state machine over a [`CredentialStore`].
#[derive(Clone)]
pub struct RefreshTokenManager {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    ttl_secs: i64,
}

impl fmt::Debug for RefreshTokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshTokenManager")
            .field("hasher", &self.hasher)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl RefreshTokenManager {
    pub fn new(store: Arc<dyn CredentialStore>, hasher: PasswordHasher, ttl_secs: i64) -> Self {
        Self {
            store,
            hasher,
            ttl_secs,
        }
    }

    /// Lifetime given to newly created records.
    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Create a record for `(user_id, program_id)` and return the plaintext
    /// token. The secret is not recoverable afterwards.
    pub async fn create(
        &self,
        user_id: Uuid,
        program_id: Uuid,
        client: &ClientContext,
    ) -> Result<RefreshToken, AuthError> {
        let (token, record) = self.mint(user_id, program_id, client)?;
        let id = self
            .store
            .create_refresh(record)
            .await?
            .ok_or_else(|| AuthError::Internal("failed to create refresh token".into()))?;
        debug!(token_id = %id, %user_id, %program_id, "refresh token created");
        Ok(token)
    }

    /// Check a presented token without consuming it.
    ///
    /// Order: parse, fetch, secret, expiry, revocation. A missing record and
    /// a wrong secret both report [`AuthError::TokenNotFound`].
    pub async fn verify(&self, presented: &str) -> Result<RefreshTokenRecord, AuthError> {
        let token = RefreshToken::parse(presented)?;
        let Some(record) = self.store.get_refresh_by_id(token.id).await? else {
            debug!(token_id = %token.id, "refresh token not found");
            return Err(AuthError::TokenNotFound);
        };
        if !self
            .hasher
            .verify(&token.secret, &record.token_hash, &record.token_salt)
        {
            debug!(token_id = %token.id, "refresh token secret mismatch");
            return Err(AuthError::TokenNotFound);
        }
        if record.is_expired(Utc::now()) {
            debug!(token_id = %record.id, "refresh token expired");
            return Err(AuthError::TokenExpired);
        }
        if record.is_revoked() {
            warn!(
                token_id = %record.id,
                user_id = %record.user_id,
                replaced_by = ?record.replaced_by_token_id,
                "revoked refresh token presented"
            );
            return Err(AuthError::TokenRevoked);
        }
        Ok(record)
    }

    /// Replace a record returned by [`Self::verify`] with a successor.
    ///
    /// Losing a concurrent race for the same record yields
    /// [`AuthError::TokenRevoked`] and writes nothing.
    pub async fn rotate(
        &self,
        record: &RefreshTokenRecord,
        client: &ClientContext,
    ) -> Result<Rotation, AuthError> {
        let (token, successor) = self.mint(record.user_id, record.program_id, client)?;
        match self.store.replace_refresh(record.id, successor).await? {
            Some(new_id) => {
                debug!(old_token_id = %record.id, token_id = %new_id, "refresh token rotated");
                Ok(Rotation {
                    token,
                    user_id: record.user_id,
                    program_id: record.program_id,
                })
            }
            None => {
                warn!(token_id = %record.id, "refresh token rotated concurrently");
                Err(AuthError::TokenRevoked)
            }
        }
    }

    /// [`Self::verify`] followed by [`Self::rotate`].
    pub async fn verify_and_rotate(
        &self,
        presented: &str,
        client: &ClientContext,
    ) -> Result<Rotation, AuthError> {
        let record = self.verify(presented).await?;
        self.rotate(&record, client).await
    }

    /// Revoke a record by id. Revoking twice is not an error.
    ///
    /// Only the named record is touched; successors stay live.
    pub async fn revoke(&self, id: Uuid) -> Result<Revocation, AuthError> {
        if self.store.revoke_refresh(id).await? {
            Ok(Revocation::Revoked)
        } else {
            Ok(Revocation::AlreadyRevoked)
        }
    }

    /// Revoke a presented token on behalf of `user_id`.
    ///
    /// An unparseable, unknown or foreign token, or a wrong secret, fails
    /// with [`AuthError::Unauthorized`]. An already revoked token succeeds
    /// with [`Revocation::AlreadyRevoked`].
    pub async fn revoke_owned(&self, presented: &str, user_id: Uuid) -> Result<Revocation, AuthError> {
        let token = RefreshToken::parse(presented)
            .map_err(|_| AuthError::Unauthorized("malformed refresh token".into()))?;
        let record = match self.store.get_refresh_by_id(token.id).await? {
            Some(record) if record.user_id == user_id => record,
            Some(_) => {
                warn!(token_id = %token.id, %user_id, "logout with another user's refresh token");
                return Err(AuthError::Unauthorized("refresh token not owned by caller".into()));
            }
            None => return Err(AuthError::Unauthorized("refresh token not found".into())),
        };
        if !self
            .hasher
            .verify(&token.secret, &record.token_hash, &record.token_salt)
        {
            return Err(AuthError::Unauthorized("refresh token secret mismatch".into()));
        }
        if record.is_revoked() {
            return Ok(Revocation::AlreadyRevoked);
        }
        let outcome = self.revoke(record.id).await?;
        info!(token_id = %record.id, %user_id, "refresh token revoked");
        Ok(outcome)
    }

    fn mint(
        &self,
        user_id: Uuid,
        program_id: Uuid,
        client: &ClientContext,
    ) -> Result<(RefreshToken, NewRefreshToken), AuthError> {
        let expires_at = expiry_after(Utc::now(), self.ttl_secs)?;
        let secret: String = rng()
            .sample_iter(&Alphanumeric)
            .take(SECRET_LEN)
            .map(char::from)
            .collect();
        let hashed = self.hasher.hash(&secret);
        let id = uuidv7();
        let record = NewRefreshToken {
            id,
            user_id,
            program_id,
            token_hash: hashed.hash,
            token_salt: hashed.salt,
            expires_at,
            device_info: Some(client.device_info()),
            user_agent: client.user_agent.clone(),
        };
        Ok((RefreshToken { id, secret }, record))
    }
}
