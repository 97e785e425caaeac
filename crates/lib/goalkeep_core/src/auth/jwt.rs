//! Bearer token issuance and verification (HS256 JWTs).
//!
//! Two token kinds share one signing key:
//! - session tokens prove a password check and carry
//!   `auth_stage = "selecting_program"` but no role or program;
//! - access tokens carry the role and program chosen in phase 2.
//!
//! Verification requires a valid signature, the configured issuer, and an
//! unexpired `exp` with zero leeway. Audience is not checked.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use super::{AuthError, expiry_after};
use crate::config::AuthConfig;
use crate::models::auth::{AccessClaims, Principal, STAGE_SELECTING_PROGRAM, SessionClaims};
use crate::policy::Role;
use crate::uuid::uuidv4;

/// Signs and verifies session and access tokens.
#[derive(Clone)]
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    session_ttl_secs: i64,
    access_ttl_secs: i64,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("issuer", &self.issuer)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.signing_key.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: config.issuer.clone(),
            session_ttl_secs: config.session_ttl_secs,
            access_ttl_secs: config.access_ttl_secs,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Mint a phase-1 session token (no role, no program).
    pub fn issue_session_token(&self, user_id: Uuid, email: &str) -> Result<String, AuthError> {
        self.issue_session_token_at(user_id, email, Utc::now())
    }

    pub fn issue_session_token_at(
        &self,
        user_id: Uuid,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = SessionClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            jti: uuidv4().to_string(),
            auth_stage: STAGE_SELECTING_PROGRAM.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expiry_after(now, self.session_ttl_secs)?.timestamp(),
        };
        self.sign(&claims)
    }

    /// Mint a phase-2 access token scoped to a program.
    ///
    /// Fails with [`AuthError::InvalidRole`] when `role` is not a known role.
    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        email: &str,
        role: &str,
        program_id: Uuid,
    ) -> Result<String, AuthError> {
        self.issue_access_token_at(user_id, email, role, program_id, Utc::now())
    }

    pub fn issue_access_token_at(
        &self,
        user_id: Uuid,
        email: &str,
        role: &str,
        program_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let role: Role = role
            .parse()
            .map_err(|_| AuthError::InvalidRole(role.to_string()))?;
        let claims = AccessClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            jti: uuidv4().to_string(),
            role: role.as_str().to_string(),
            program_id: program_id.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expiry_after(now, self.access_ttl_secs)?.timestamp(),
        };
        self.sign(&claims)
    }

    /// Verify a session token and check its stage claim.
    pub fn verify_session_token(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let claims: SessionClaims = self.verify(token)?;
        if claims.auth_stage != STAGE_SELECTING_PROGRAM {
            return Err(AuthError::Unauthorized(
                "a session token is required to select a program".into(),
            ));
        }
        Ok(claims)
    }

    /// Verify an access token, returning its claims.
    ///
    /// Session tokens fail here because they lack `role` and `program_id`.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.verify(token)
    }

    /// Verify an access token and resolve it into a typed [`Principal`].
    pub fn principal(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.verify_access_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::Unauthorized("subject is not a user id".into()))?;
        let program_id = Uuid::parse_str(&claims.program_id)
            .map_err(|_| AuthError::Unauthorized("program claim is not an id".into()))?;
        let role = claims
            .role
            .parse()
            .map_err(|_| AuthError::InvalidRole(claims.role.clone()))?;
        Ok(Principal {
            user_id,
            email: claims.email,
            role,
            program_id,
        })
    }

    fn sign<T: serde::Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_aud = false;
        validation.validate_exp = true;
        validation.leeway = 0;
        decode::<T>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "bearer token rejected");
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => AuthError::Unauthorized(format!("invalid bearer token: {e}")),
                }
            })
    }
}

#[derive(Deserialize)]
struct ExpiryOnly {
    exp: i64,
}

/// Seconds until `token` expires, measured now.
pub fn remaining_validity_seconds(token: &str) -> i64 {
    remaining_validity_seconds_at(token, Utc::now())
}

/// Seconds until `token` expires, measured at `now`.
///
/// Reads `exp` without checking the signature; the result is informational
/// only. Never negative, and 0 for anything that does not parse.
pub fn remaining_validity_seconds_at(token: &str, now: DateTime<Utc>) -> i64 {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.set_required_spec_claims(&["exp"]);
    validation.validate_exp = false;
    validation.validate_aud = false;
    match decode::<ExpiryOnly>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => (data.claims.exp - now.timestamp()).max(0),
        Err(_) => 0,
    }
}
