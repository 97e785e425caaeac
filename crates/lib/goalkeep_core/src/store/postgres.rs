//! PostgreSQL store.
//!
//! Timestamps and dates are bound from the application clock rather than the
//! server's `now()`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{AssignmentStore, CredentialStore, UserDirectory};
use crate::auth::{AuthError, expiry_after};
use crate::models::assignment::{AssignmentKind, AssignmentRecord};
use crate::models::auth::{
    MembershipStatus, NewRefreshToken, ProgramUser, RefreshTokenRecord, User, UserProgram,
};

type RefreshRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<Uuid>,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

type UserRow = (
    Uuid,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    i32,
    Option<DateTime<Utc>>,
);

const USER_COLUMNS: &str = "id, email, name, password_hash, password_salt, \
     failed_login_attempts, locked_until";

const REFRESH_INSERT: &str = "INSERT INTO refresh_tokens \
     (id, user_id, program_id, token_hash, token_salt, expires_at, device_info, user_agent, \
      created_at, updated_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) \
     ON CONFLICT (id) DO NOTHING";

/// Store backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bind_new_refresh<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    token: &'q NewRefreshToken,
    now: DateTime<Utc>,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(token.id)
        .bind(token.user_id)
        .bind(token.program_id)
        .bind(&token.token_hash)
        .bind(&token.token_salt)
        .bind(token.expires_at)
        .bind(&token.device_info)
        .bind(&token.user_agent)
        .bind(now)
}

fn user_from_row(row: UserRow) -> User {
    let (id, email, name, password_hash, password_salt, failed_login_attempts, locked_until) = row;
    User {
        id,
        email,
        name,
        password_hash,
        password_salt,
        failed_login_attempts,
        locked_until,
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn create_refresh(&self, token: NewRefreshToken) -> Result<Option<Uuid>, AuthError> {
        let result = bind_new_refresh(sqlx::query(REFRESH_INSERT), &token, Utc::now())
            .execute(&self.pool)
            .await?;
        Ok((result.rows_affected() == 1).then_some(token.id))
    }

    async fn get_refresh_by_id(&self, id: Uuid) -> Result<Option<RefreshTokenRecord>, AuthError> {
        let row = sqlx::query_as::<_, RefreshRow>(
            "SELECT id, user_id, program_id, token_hash, token_salt, expires_at, revoked_at, \
                    replaced_by_token_id, device_info, user_agent, created_at, updated_at \
             FROM refresh_tokens WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(
                id,
                user_id,
                program_id,
                token_hash,
                token_salt,
                expires_at,
                revoked_at,
                replaced_by_token_id,
                device_info,
                user_agent,
                created_at,
                updated_at,
            )| RefreshTokenRecord {
                id,
                user_id,
                program_id,
                token_hash,
                token_salt,
                expires_at,
                revoked_at,
                replaced_by_token_id,
                device_info,
                user_agent,
                created_at,
                updated_at,
            },
        ))
    }

    async fn revoke_refresh(&self, id: Uuid) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2, updated_at = $2 \
             WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn replace_refresh(
        &self,
        old_id: Uuid,
        successor: NewRefreshToken,
    ) -> Result<Option<Uuid>, AuthError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            "UPDATE refresh_tokens \
             SET revoked_at = $3, replaced_by_token_id = $2, updated_at = $3 \
             WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(old_id)
        .bind(successor.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if revoked.rows_affected() != 1 {
            tx.rollback().await?;
            debug!(%old_id, "refresh token already revoked, not replacing");
            return Ok(None);
        }

        let inserted = bind_new_refresh(sqlx::query(REFRESH_INSERT), &successor, now)
            .execute(&mut *tx)
            .await?;
        if inserted.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(successor.id))
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn get_programs_for_user(&self, user_id: Uuid) -> Result<Vec<UserProgram>, AuthError> {
        let rows = sqlx::query_as::<_, (Uuid, String, String, String, bool)>(
            "SELECT p.id, p.name, pu.role, pu.role_display_name, pu.is_primary \
             FROM program_users pu \
             JOIN programs p ON p.id = pu.program_id \
             WHERE pu.user_id = $1 AND pu.status = 'active' \
             ORDER BY pu.is_primary DESC, p.name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(
                |(program_id, program_name, role, role_display_name, is_primary)| UserProgram {
                    program_id,
                    program_name,
                    role,
                    role_display_name,
                    is_primary,
                },
            )
            .collect())
    }

    async fn get_program_user(
        &self,
        user_id: Uuid,
        program_id: Uuid,
    ) -> Result<Option<ProgramUser>, AuthError> {
        let row = sqlx::query_as::<_, (String, String, String, String, String)>(
            "SELECT u.email, p.name, pu.role, pu.role_display_name, pu.status \
             FROM program_users pu \
             JOIN users u ON u.id = pu.user_id \
             JOIN programs p ON p.id = pu.program_id \
             WHERE pu.user_id = $1 AND pu.program_id = $2",
        )
        .bind(user_id)
        .bind(program_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(email, program_name, role, role_display_name, status)| ProgramUser {
                user_id,
                email,
                program_id,
                program_name,
                role,
                role_display_name,
                status: MembershipStatus::parse(&status),
            },
        ))
    }

    async fn record_failed_login(
        &self,
        user_id: Uuid,
        max_attempts: i32,
        lockout_secs: i64,
    ) -> Result<bool, AuthError> {
        let now = Utc::now();
        let lock_until = expiry_after(now, lockout_secs)?;
        let locked = sqlx::query_scalar::<_, bool>(
            "UPDATE users SET \
                 locked_until = CASE WHEN failed_login_attempts + 1 >= $2 \
                     THEN $3 ELSE locked_until END, \
                 failed_login_attempts = CASE WHEN failed_login_attempts + 1 >= $2 \
                     THEN 0 ELSE failed_login_attempts + 1 END, \
                 updated_at = $4 \
             WHERE id = $1 \
             RETURNING locked_until IS NOT NULL AND locked_until > $4",
        )
        .bind(user_id)
        .bind(max_attempts)
        .bind(lock_until)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(locked.unwrap_or(false))
    }

    async fn reset_failed_logins(&self, user_id: Uuid) -> Result<(), AuthError> {
        sqlx::query(
            "UPDATE users SET failed_login_attempts = 0, locked_until = NULL \
             WHERE id = $1 AND (failed_login_attempts <> 0 OR locked_until IS NOT NULL)",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AssignmentStore for PgStore {
    async fn get_active_assignment(
        &self,
        user_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<AssignmentRecord>, AuthError> {
        let row = sqlx::query_as::<_, (String, chrono::NaiveDate, Option<chrono::NaiveDate>, bool)>(
            "SELECT assignment_type, start_date, end_date, is_active \
             FROM student_assignments \
             WHERE user_id = $1 AND student_id = $2 \
               AND is_active \
               AND start_date <= $3 \
               AND (end_date IS NULL OR end_date >= $3) \
             ORDER BY start_date DESC \
             LIMIT 1",
        )
        .bind(user_id)
        .bind(student_id)
        .bind(Utc::now().date_naive())
        .fetch_optional(&self.pool)
        .await?;
        let Some((kind, start_date, end_date, is_active)) = row else {
            return Ok(None);
        };
        let Some(kind) = AssignmentKind::parse(&kind) else {
            debug!(%user_id, %student_id, kind = %kind, "unrecognized assignment type");
            return Ok(None);
        };
        Ok(Some(AssignmentRecord {
            user_id,
            student_id,
            kind,
            start_date,
            end_date,
            is_active,
        }))
    }

    async fn list_accessible_students(&self, user_id: Uuid) -> Result<Vec<Uuid>, AuthError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT student_id FROM student_assignments \
             WHERE user_id = $1 \
               AND is_active \
               AND start_date <= $2 \
               AND (end_date IS NULL OR end_date >= $2) \
             ORDER BY student_id",
        )
        .bind(user_id)
        .bind(Utc::now().date_naive())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
