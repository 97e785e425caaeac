//! Login orchestration: password check, program selection, refresh, logout.
//!
//! Each operation returns a typed outcome or an [`AuthError`] naming the
//! precise cause. Collapsing causes into outward messages is left to the
//! caller via [`AuthError::public_message`].

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::AuthError;
use super::jwt::{TokenAuthority, remaining_validity_seconds};
use super::password::PasswordHasher;
use super::refresh::{RefreshTokenManager, Revocation};
use crate::config::AuthConfig;
use crate::models::auth::{ClientContext, MembershipStatus, Principal, ProgramUser, UserProgram};
use crate::store::{CredentialStore, UserDirectory};

/// Phase 1 result: a session token and the programs it may be exchanged for.
#[derive(Debug, Clone, Serialize)]
pub struct SessionIssued {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub session_token: String,
    pub expires_in: i64,
    pub programs: Vec<UserProgram>,
}

/// Phase 2 result: program-scoped access token plus a refresh token.
#[derive(Debug, Clone, Serialize)]
pub struct AccessIssued {
    pub user_id: Uuid,
    pub email: String,
    pub program_id: Uuid,
    pub program_name: String,
    pub role: String,
    pub role_display_name: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Result of exchanging a refresh token.
#[derive(Debug, Clone, Serialize)]
pub struct Rotated {
    pub user_id: Uuid,
    pub program_id: Uuid,
    pub role: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Composes password checks, token issuance and refresh rotation.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    tokens: TokenAuthority,
    refresh: RefreshTokenManager,
    hasher: PasswordHasher,
    max_failed_logins: i32,
    lockout_secs: i64,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("tokens", &self.tokens)
            .field("refresh", &self.refresh)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    pub fn new(
        config: &AuthConfig,
        users: Arc<dyn UserDirectory>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let hasher = config.password_hasher();
        Self {
            users,
            tokens: TokenAuthority::new(config),
            refresh: RefreshTokenManager::new(credentials, hasher, config.refresh_ttl_secs),
            hasher,
            max_failed_logins: config.max_failed_logins,
            lockout_secs: config.lockout_secs,
        }
    }

    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    pub fn refresh_tokens(&self) -> &RefreshTokenManager {
        &self.refresh
    }

    /// Check a password and issue a session token.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionIssued, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::Validation("email and password are required".into()));
        }

        let Some(user) = self.users.get_user_by_email(email).await? else {
            // Same hashing cost as a known account.
            let _ = self.hasher.hash(password);
            info!(reason = "unknown email", "login failed");
            return Err(AuthError::InvalidCredentials);
        };

        if user.is_locked(Utc::now()) {
            info!(user_id = %user.id, "login rejected: account locked");
            return Err(AuthError::AccountLocked);
        }

        let (Some(hash), Some(salt)) = (&user.password_hash, &user.password_salt) else {
            info!(user_id = %user.id, reason = "password not set", "login failed");
            return Err(AuthError::PasswordNotSet);
        };

        if !self.hasher.verify(password, hash, salt) {
            let locked = self
                .users
                .record_failed_login(user.id, self.max_failed_logins, self.lockout_secs)
                .await?;
            if locked {
                info!(user_id = %user.id, lockout_secs = self.lockout_secs, "account locked after repeated failures");
            }
            info!(user_id = %user.id, reason = "wrong password", "login failed");
            return Err(AuthError::InvalidCredentials);
        }

        if user.failed_login_attempts > 0 || user.locked_until.is_some() {
            self.users.reset_failed_logins(user.id).await?;
        }

        let programs = self.users.get_programs_for_user(user.id).await?;
        if programs.is_empty() {
            info!(user_id = %user.id, reason = "no active programs", "login failed");
            return Err(AuthError::NoProfile("no active programs".into()));
        }

        let session_token = self.tokens.issue_session_token(user.id, &user.email)?;
        info!(user_id = %user.id, programs = programs.len(), "session issued");
        Ok(SessionIssued {
            user_id: user.id,
            email: user.email,
            name: user.name,
            expires_in: remaining_validity_seconds(&session_token),
            session_token,
            programs,
        })
    }

    /// Exchange a session token for access and refresh tokens in one program.
    pub async fn select_program(
        &self,
        session_token: &str,
        program_id: Uuid,
        client: &ClientContext,
    ) -> Result<AccessIssued, AuthError> {
        let claims = self.tokens.verify_session_token(session_token)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::Unauthorized("subject is not a user id".into()))?;

        let user = self
            .users
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("user".into()))?;
        let membership = self.active_membership(user_id, program_id).await?;

        let access_token =
            self.tokens
                .issue_access_token(user.id, &user.email, &membership.role, program_id)?;
        let refresh_token = self.refresh.create(user.id, program_id, client).await?;

        info!(%user_id, %program_id, role = %membership.role, "program selected");
        Ok(AccessIssued {
            user_id: user.id,
            email: user.email,
            program_id,
            program_name: membership.program_name,
            role: membership.role,
            role_display_name: membership.role_display_name,
            expires_in: remaining_validity_seconds(&access_token),
            access_token,
            refresh_token: refresh_token.to_string(),
        })
    }

    /// Rotate a refresh token and issue a fresh access token.
    ///
    /// The role comes from the current membership, not the one in force when
    /// the refresh token was created.
    pub async fn refresh(
        &self,
        presented: &str,
        client: &ClientContext,
    ) -> Result<Rotated, AuthError> {
        if presented.trim().is_empty() {
            return Err(AuthError::MissingCredential);
        }
        let record = self.refresh.verify(presented).await?;
        let membership = self
            .active_membership(record.user_id, record.program_id)
            .await?;

        let rotation = self.refresh.rotate(&record, client).await?;
        let access_token = self.tokens.issue_access_token(
            rotation.user_id,
            &membership.email,
            &membership.role,
            rotation.program_id,
        )?;

        debug!(user_id = %rotation.user_id, program_id = %rotation.program_id, "access token refreshed");
        Ok(Rotated {
            user_id: rotation.user_id,
            program_id: rotation.program_id,
            role: membership.role,
            expires_in: remaining_validity_seconds(&access_token),
            access_token,
            refresh_token: rotation.token.to_string(),
        })
    }

    /// Revoke `refresh_token` on behalf of the holder of `access_token`.
    pub async fn logout(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Revocation, AuthError> {
        let principal = self.tokens.principal(access_token)?;
        self.logout_as(&principal, refresh_token).await
    }

    /// Revoke `refresh_token` for an already verified principal.
    pub async fn logout_as(
        &self,
        principal: &Principal,
        refresh_token: &str,
    ) -> Result<Revocation, AuthError> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::MissingCredential);
        }
        let outcome = self
            .refresh
            .revoke_owned(refresh_token, principal.user_id)
            .await?;
        if outcome == Revocation::AlreadyRevoked {
            debug!(user_id = %principal.user_id, "logout with already revoked token");
        }
        Ok(outcome)
    }

    async fn active_membership(
        &self,
        user_id: Uuid,
        program_id: Uuid,
    ) -> Result<ProgramUser, AuthError> {
        match self.users.get_program_user(user_id, program_id).await? {
            Some(m) if m.status == MembershipStatus::Active => Ok(m),
            Some(_) => {
                debug!(%user_id, %program_id, "membership inactive");
                Err(AuthError::Unauthorized("program membership is inactive".into()))
            }
            None => {
                debug!(%user_id, %program_id, "no membership");
                Err(AuthError::Unauthorized("user is not assigned to this program".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::STAGE_SELECTING_PROGRAM;
    use crate::store::MemoryStore;
    use crate::uuid::uuidv7;

    const PASSWORD: &str = "correct horse battery";

    struct Fixture {
        store: Arc<MemoryStore>,
        service: AuthService,
        user_id: Uuid,
        program_id: Uuid,
    }

    fn config() -> AuthConfig {
        AuthConfig {
            password_iterations: 10,
            max_failed_logins: 3,
            ..AuthConfig::with_signing_key("test-signing-key")
        }
    }

    async fn fixture() -> Fixture {
        let config = config();
        let store = Arc::new(MemoryStore::new());
        let user_id = store
            .add_user(
                "teacher@example.org",
                Some("Pat Teacher"),
                Some(config.password_hasher().hash(PASSWORD)),
            )
            .await;
        let program_id = uuidv7();
        store
            .add_membership(
                user_id,
                UserProgram {
                    program_id,
                    program_name: "North Elementary".into(),
                    role: "Teacher".into(),
                    role_display_name: "Teacher".into(),
                    is_primary: true,
                },
                MembershipStatus::Active,
            )
            .await;
        let service = AuthService::new(&config, store.clone(), store.clone());
        Fixture {
            store,
            service,
            user_id,
            program_id,
        }
    }

    async fn signed_in(f: &Fixture) -> AccessIssued {
        let session = f.service.login("teacher@example.org", PASSWORD).await.unwrap();
        f.service
            .select_program(&session.session_token, f.program_id, &ClientContext::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn login_issues_session_token_without_role() {
        let f = fixture().await;
        let session = f.service.login("teacher@example.org", PASSWORD).await.unwrap();

        assert_eq!(session.user_id, f.user_id);
        assert_eq!(session.programs.len(), 1);
        assert!(session.expires_in > 0 && session.expires_in <= 300);

        let claims = f.service.tokens().verify_session_token(&session.session_token).unwrap();
        assert_eq!(claims.auth_stage, STAGE_SELECTING_PROGRAM);
        assert!(f.service.tokens().verify_access_token(&session.session_token).is_err());
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_indistinguishable() {
        let f = fixture().await;
        let wrong = f.service.login("teacher@example.org", "nope").await.unwrap_err();
        let unknown = f.service.login("ghost@example.org", PASSWORD).await.unwrap_err();
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(wrong.public_message(), unknown.public_message());
    }

    #[tokio::test]
    async fn repeated_failures_lock_the_account() {
        let f = fixture().await;
        for _ in 0..3 {
            let _ = f.service.login("teacher@example.org", "nope").await;
        }
        assert!(matches!(
            f.service.login("teacher@example.org", PASSWORD).await,
            Err(AuthError::AccountLocked)
        ));
    }

    #[tokio::test]
    async fn successful_login_resets_failure_count() {
        let f = fixture().await;
        for _ in 0..2 {
            let _ = f.service.login("teacher@example.org", "nope").await;
        }
        f.service.login("teacher@example.org", PASSWORD).await.unwrap();
        for _ in 0..2 {
            let _ = f.service.login("teacher@example.org", "nope").await;
        }
        assert!(f.service.login("teacher@example.org", PASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn login_without_password_or_programs_has_no_profile() {
        let f = fixture().await;
        f.store.add_user("nopass@example.org", None, None).await;
        let err = f.service.login("nopass@example.org", "whatever").await.unwrap_err();
        assert!(matches!(err, AuthError::PasswordNotSet));
        assert_eq!(
            err.public_message(),
            "Password not set. Please contact an administrator."
        );

        f.store
            .set_membership_status(f.user_id, f.program_id, MembershipStatus::Inactive)
            .await;
        assert!(matches!(
            f.service.login("teacher@example.org", PASSWORD).await,
            Err(AuthError::NoProfile(ref m)) if m == "no active programs"
        ));
    }

    #[tokio::test]
    async fn empty_input_is_a_validation_error() {
        let f = fixture().await;
        assert!(matches!(
            f.service.login("  ", PASSWORD).await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            f.service.login("teacher@example.org", "").await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn select_program_issues_scoped_tokens() {
        let f = fixture().await;
        let issued = signed_in(&f).await;

        assert_eq!(issued.program_name, "North Elementary");
        assert_eq!(issued.role, "Teacher");
        assert!(issued.expires_in > 0 && issued.expires_in <= 900);

        let principal = f.service.tokens().principal(&issued.access_token).unwrap();
        assert_eq!(principal.user_id, f.user_id);
        assert_eq!(principal.program_id, f.program_id);
        assert_eq!(principal.role, crate::policy::Role::Teacher);
    }

    #[tokio::test]
    async fn select_unassigned_or_inactive_program_is_unauthorized() {
        let f = fixture().await;
        let session = f.service.login("teacher@example.org", PASSWORD).await.unwrap();
        let ctx = ClientContext::default();

        assert!(matches!(
            f.service.select_program(&session.session_token, uuidv7(), &ctx).await,
            Err(AuthError::Unauthorized(_))
        ));

        f.store
            .set_membership_status(f.user_id, f.program_id, MembershipStatus::Inactive)
            .await;
        assert!(matches!(
            f.service.select_program(&session.session_token, f.program_id, &ctx).await,
            Err(AuthError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn access_token_cannot_select_a_program() {
        let f = fixture().await;
        let issued = signed_in(&f).await;
        assert!(matches!(
            f.service
                .select_program(&issued.access_token, f.program_id, &ClientContext::default())
                .await,
            Err(AuthError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn unknown_role_is_rejected_at_selection() {
        let f = fixture().await;
        let other = uuidv7();
        f.store
            .add_membership(
                f.user_id,
                UserProgram {
                    program_id: other,
                    program_name: "Annex".into(),
                    role: "Janitor".into(),
                    role_display_name: "Janitor".into(),
                    is_primary: false,
                },
                MembershipStatus::Active,
            )
            .await;
        let session = f.service.login("teacher@example.org", PASSWORD).await.unwrap();
        assert!(matches!(
            f.service
                .select_program(&session.session_token, other, &ClientContext::default())
                .await,
            Err(AuthError::InvalidRole(_))
        ));
    }

    #[tokio::test]
    async fn refresh_rotates_and_rejects_replay() {
        let f = fixture().await;
        let issued = signed_in(&f).await;
        let ctx = ClientContext::default();

        let rotated = f.service.refresh(&issued.refresh_token, &ctx).await.unwrap();
        assert_ne!(rotated.refresh_token, issued.refresh_token);
        assert_eq!(rotated.program_id, f.program_id);
        assert!(remaining_validity_seconds(&rotated.access_token) > 0);

        assert!(matches!(
            f.service.refresh(&issued.refresh_token, &ctx).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn refresh_fails_once_membership_is_inactive() {
        let f = fixture().await;
        let issued = signed_in(&f).await;
        f.store
            .set_membership_status(f.user_id, f.program_id, MembershipStatus::Inactive)
            .await;
        assert!(matches!(
            f.service.refresh(&issued.refresh_token, &ClientContext::default()).await,
            Err(AuthError::Unauthorized(_))
        ));
        // The refused refresh did not consume the token.
        let live = f.store.refresh_tokens().await;
        assert!(live.iter().all(|r| !r.is_revoked()));
    }

    #[tokio::test]
    async fn refresh_rejects_malformed_and_missing_tokens() {
        let f = fixture().await;
        let ctx = ClientContext::default();
        assert!(matches!(
            f.service.refresh("", &ctx).await,
            Err(AuthError::MissingCredential)
        ));
        assert!(matches!(
            f.service.refresh("garbage", &ctx).await,
            Err(AuthError::MalformedToken)
        ));
    }

    #[tokio::test]
    async fn logout_is_idempotent_and_owner_only() {
        let f = fixture().await;
        let issued = signed_in(&f).await;

        let intruder = f
            .service
            .tokens()
            .issue_access_token(uuidv7(), "x@example.org", "Teacher", f.program_id)
            .unwrap();
        assert!(matches!(
            f.service.logout(&intruder, &issued.refresh_token).await,
            Err(AuthError::Unauthorized(_))
        ));

        assert_eq!(
            f.service
                .logout(&issued.access_token, &issued.refresh_token)
                .await
                .unwrap(),
            Revocation::Revoked
        );
        assert_eq!(
            f.service
                .logout(&issued.access_token, &issued.refresh_token)
                .await
                .unwrap(),
            Revocation::AlreadyRevoked
        );
        assert!(matches!(
            f.service.refresh(&issued.refresh_token, &ClientContext::default()).await,
            Err(AuthError::TokenRevoked)
        ));
    }
}
