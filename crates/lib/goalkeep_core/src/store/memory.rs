//! In-memory store for tests and local demos.
//!
//! Refresh-token rotation holds the token map lock across the
//! check-revoke-insert sequence, which gives the same single-winner
//! guarantee as the conditional `UPDATE` in the PostgreSQL store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{AssignmentStore, CredentialStore, UserDirectory};
use crate::auth::{AuthError, expiry_after};
use crate::auth::password::PasswordHash;
use crate::models::assignment::AssignmentRecord;
use crate::models::auth::{
    MembershipStatus, NewRefreshToken, ProgramUser, RefreshTokenRecord, User, UserProgram,
};
use crate::uuid::uuidv7;

#[derive(Debug, Clone)]
struct Membership {
    user_id: Uuid,
    program: UserProgram,
    status: MembershipStatus,
}

/// Map-backed implementation of every store trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    memberships: RwLock<Vec<Membership>>,
    assignments: RwLock<Vec<AssignmentRecord>>,
    refresh_tokens: Mutex<HashMap<Uuid, RefreshTokenRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user. `password` is `None` for accounts without a password.
    pub async fn add_user(&self, email: &str, name: Option<&str>, password: Option<PasswordHash>) -> Uuid {
        let id = uuidv7();
        let (password_hash, password_salt) = match password {
            Some(p) => (Some(p.hash), Some(p.salt)),
            None => (None, None),
        };
        self.users.write().await.insert(
            id,
            User {
                id,
                email: email.to_string(),
                name: name.map(str::to_string),
                password_hash,
                password_salt,
                failed_login_attempts: 0,
                locked_until: None,
            },
        );
        id
    }

    /// Add a program membership for a user.
    pub async fn add_membership(
        &self,
        user_id: Uuid,
        program: UserProgram,
        status: MembershipStatus,
    ) {
        self.memberships.write().await.push(Membership {
            user_id,
            program,
            status,
        });
    }

    /// Change the status of an existing membership.
    pub async fn set_membership_status(&self, user_id: Uuid, program_id: Uuid, status: MembershipStatus) {
        let mut memberships = self.memberships.write().await;
        for m in memberships
            .iter_mut()
            .filter(|m| m.user_id == user_id && m.program.program_id == program_id)
        {
            m.status = status;
        }
    }

    pub async fn add_assignment(&self, record: AssignmentRecord) {
        self.assignments.write().await.push(record);
    }

    /// Snapshot of every refresh-token record, for inspection.
    pub async fn refresh_tokens(&self) -> Vec<RefreshTokenRecord> {
        self.refresh_tokens.lock().await.values().cloned().collect()
    }

    fn build_record(token: NewRefreshToken) -> RefreshTokenRecord {
        let now = Utc::now();
        RefreshTokenRecord {
            id: token.id,
            user_id: token.user_id,
            program_id: token.program_id,
            token_hash: token.token_hash,
            token_salt: token.token_salt,
            expires_at: token.expires_at,
            revoked_at: None,
            replaced_by_token_id: None,
            device_info: token.device_info,
            user_agent: token.user_agent,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create_refresh(&self, token: NewRefreshToken) -> Result<Option<Uuid>, AuthError> {
        let mut tokens = self.refresh_tokens.lock().await;
        if tokens.contains_key(&token.id) {
            return Ok(None);
        }
        let record = Self::build_record(token);
        let id = record.id;
        tokens.insert(id, record);
        Ok(Some(id))
    }

    async fn get_refresh_by_id(&self, id: Uuid) -> Result<Option<RefreshTokenRecord>, AuthError> {
        Ok(self.refresh_tokens.lock().await.get(&id).cloned())
    }

    async fn revoke_refresh(&self, id: Uuid) -> Result<bool, AuthError> {
        let mut tokens = self.refresh_tokens.lock().await;
        match tokens.get_mut(&id) {
            Some(record) if record.revoked_at.is_none() => {
                let now = Utc::now();
                record.revoked_at = Some(now);
                record.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn replace_refresh(
        &self,
        old_id: Uuid,
        successor: NewRefreshToken,
    ) -> Result<Option<Uuid>, AuthError> {
        let mut tokens = self.refresh_tokens.lock().await;
        if tokens.contains_key(&successor.id) {
            return Ok(None);
        }
        let Some(old) = tokens.get_mut(&old_id) else {
            return Ok(None);
        };
        if old.revoked_at.is_some() {
            return Ok(None);
        }
        let now = Utc::now();
        old.revoked_at = Some(now);
        old.replaced_by_token_id = Some(successor.id);
        old.updated_at = now;

        let record = Self::build_record(successor);
        let new_id = record.id;
        tokens.insert(new_id, record);
        Ok(Some(new_id))
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn get_programs_for_user(&self, user_id: Uuid) -> Result<Vec<UserProgram>, AuthError> {
        Ok(self
            .memberships
            .read()
            .await
            .iter()
            .filter(|m| m.user_id == user_id && m.status == MembershipStatus::Active)
            .map(|m| m.program.clone())
            .collect())
    }

    async fn get_program_user(
        &self,
        user_id: Uuid,
        program_id: Uuid,
    ) -> Result<Option<ProgramUser>, AuthError> {
        let Some(user) = self.users.read().await.get(&user_id).cloned() else {
            return Ok(None);
        };
        Ok(self
            .memberships
            .read()
            .await
            .iter()
            .find(|m| m.user_id == user_id && m.program.program_id == program_id)
            .map(|m| ProgramUser {
                user_id,
                email: user.email.clone(),
                program_id,
                program_name: m.program.program_name.clone(),
                role: m.program.role.clone(),
                role_display_name: m.program.role_display_name.clone(),
                status: m.status,
            }))
    }

    async fn record_failed_login(
        &self,
        user_id: Uuid,
        max_attempts: i32,
        lockout_secs: i64,
    ) -> Result<bool, AuthError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&user_id) else {
            return Ok(false);
        };
        user.failed_login_attempts += 1;
        if user.failed_login_attempts >= max_attempts {
            user.locked_until = Some(expiry_after(Utc::now(), lockout_secs)?);
            user.failed_login_attempts = 0;
            return Ok(true);
        }
        Ok(false)
    }

    async fn reset_failed_logins(&self, user_id: Uuid) -> Result<(), AuthError> {
        if let Some(user) = self.users.write().await.get_mut(&user_id) {
            user.failed_login_attempts = 0;
            user.locked_until = None;
        }
        Ok(())
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn get_active_assignment(
        &self,
        user_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<AssignmentRecord>, AuthError> {
        let today = Utc::now().date_naive();
        Ok(self
            .assignments
            .read()
            .await
            .iter()
            .find(|a| a.user_id == user_id && a.student_id == student_id && a.is_current(today))
            .cloned())
    }

    async fn list_accessible_students(&self, user_id: Uuid) -> Result<Vec<Uuid>, AuthError> {
        let today = Utc::now().date_naive();
        let mut ids: Vec<Uuid> = self
            .assignments
            .read()
            .await
            .iter()
            .filter(|a| a.user_id == user_id && a.is_current(today))
            .map(|a| a.student_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
