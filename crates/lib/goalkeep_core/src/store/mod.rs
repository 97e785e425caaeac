//! Storage boundary.
//!
//! The auth core never talks to a database directly. It reads and writes
//! through these traits, which the PostgreSQL store and the in-memory store
//! both implement.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::models::assignment::AssignmentRecord;
use crate::models::auth::{NewRefreshToken, ProgramUser, RefreshTokenRecord, User, UserProgram};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence for refresh-token records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a record. Returns its id, or `None` if nothing was written.
    async fn create_refresh(&self, token: NewRefreshToken) -> Result<Option<Uuid>, AuthError>;

    async fn get_refresh_by_id(&self, id: Uuid) -> Result<Option<RefreshTokenRecord>, AuthError>;

    /// Mark a record revoked. Returns `false` if it was missing or already
    /// revoked.
    async fn revoke_refresh(&self, id: Uuid) -> Result<bool, AuthError>;

    /// Atomically revoke `old_id`, point it at the successor, and insert the
    /// successor.
    ///
    /// Only succeeds while `old_id` is still unrevoked; a concurrent caller
    /// that loses the race gets `None` and no successor is written.
    async fn replace_refresh(
        &self,
        old_id: Uuid,
        successor: NewRefreshToken,
    ) -> Result<Option<Uuid>, AuthError>;
}

/// Read access to users and their program memberships, plus login
/// bookkeeping.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError>;

    /// Active program memberships for a user.
    async fn get_programs_for_user(&self, user_id: Uuid) -> Result<Vec<UserProgram>, AuthError>;

    /// A user's membership in one program, whatever its status.
    async fn get_program_user(
        &self,
        user_id: Uuid,
        program_id: Uuid,
    ) -> Result<Option<ProgramUser>, AuthError>;

    /// Count a failed login, locking the account for `lockout_secs` once
    /// `max_attempts` is reached. Returns whether the account is now locked.
    async fn record_failed_login(
        &self,
        user_id: Uuid,
        max_attempts: i32,
        lockout_secs: i64,
    ) -> Result<bool, AuthError>;

    async fn reset_failed_logins(&self, user_id: Uuid) -> Result<(), AuthError>;
}

/// Read access to user-to-student assignments.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// The current assignment between a user and a student, if any.
    async fn get_active_assignment(
        &self,
        user_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<AssignmentRecord>, AuthError>;

    /// Ids of every student the user currently has an assignment to.
    ///
    /// Filtering happens here, at retrieval, so callers never hold rows for
    /// students they cannot see.
    async fn list_accessible_students(&self, user_id: Uuid) -> Result<Vec<Uuid>, AuthError>;
}
