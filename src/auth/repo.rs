use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::{
    auth::repo_types::{NewUser, Otp, User},
    db::{StoreError, StoreResult},
};

/// Persistence seam for users and their OTP codes.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    /// `AlreadyExists` when the email is taken.
    async fn create(&self, new: &NewUser) -> StoreResult<User>;
    /// Only succeeds for a verified user that has no password yet; `NotFound` otherwise.
    async fn set_password_if_unset(&self, email: &str, password_hash: &str) -> StoreResult<()>;
    async fn create_otp(
        &self,
        user_id: i64,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<Otp>;
    /// Latest code row for the user matching `code`, used or not.
    async fn find_otp(&self, user_id: i64, code: &str) -> StoreResult<Option<Otp>>;
    /// Marks the code used and the user's email verified, atomically.
    /// `NotFound` if the code was consumed concurrently.
    async fn consume_otp(&self, otp_id: i64, user_id: i64) -> StoreResult<()>;
}

const USER_COLUMNS: &str =
    "id, email, password_hash, created_at, updated_at, email_verified_at, deleted_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, new: &NewUser) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, email_verified_at)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.email_verified_at)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn set_password_if_unset(&self, email: &str, password_hash: &str) -> StoreResult<()> {
        let res = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1, updated_at = now()
            WHERE email = $2
              AND email_verified_at IS NOT NULL
              AND password_hash IS NULL
              AND deleted_at IS NULL
            "#,
        )
        .bind(password_hash)
        .bind(email)
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn create_otp(
        &self,
        user_id: i64,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<Otp> {
        let otp = sqlx::query_as::<_, Otp>(
            r#"
            INSERT INTO otps (user_id, otp_code, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, otp_code, expires_at, is_used, created_at
            "#,
        )
        .bind(user_id)
        .bind(code)
        .bind(expires_at)
        .fetch_one(&self.db)
        .await?;
        Ok(otp)
    }

    async fn find_otp(&self, user_id: i64, code: &str) -> StoreResult<Option<Otp>> {
        let otp = sqlx::query_as::<_, Otp>(
            r#"
            SELECT id, user_id, otp_code, expires_at, is_used, created_at
            FROM otps
            WHERE user_id = $1 AND otp_code = $2
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(code)
        .fetch_optional(&self.db)
        .await?;
        Ok(otp)
    }

    async fn consume_otp(&self, otp_id: i64, user_id: i64) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;

        let used = sqlx::query("UPDATE otps SET is_used = TRUE WHERE id = $1 AND is_used = FALSE")
            .bind(otp_id)
            .execute(&mut *tx)
            .await?;
        if used.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        sqlx::query(
            r#"
            UPDATE users
            SET email_verified_at = COALESCE(email_verified_at, now()), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
