use crate::models::referrals::{self, ReferralCount};
use crate::models::users::{self, ReferrerUpdate};
use crate::utils;

use sqlx::{PgPool, Postgres, Transaction};

use super::RepositoryError;

const REFERRAL_CODE_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct UserRepository {
    conn: PgPool,
}

impl UserRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    /// Inserts a user and, when `referral_code` names an existing user,
    /// moves that referrer up the referral ladder in the same transaction.
    pub async fn insert_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
        referral_code: Option<&str>,
    ) -> Result<users::User, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let email_taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&mut *tx)
                .await?;
        if email_taken {
            return Err(RepositoryError::Conflict(format!(
                "Email already registered: {}",
                email
            )));
        }

        let code = referral_code
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty());
        let referrer = match &code {
            Some(code) => {
                let referrer = sqlx::query_as::<_, users::User>(
                    "SELECT * FROM users WHERE referral_code = $1 FOR UPDATE",
                )
                .bind(code)
                .fetch_optional(&mut *tx)
                .await?;
                if referrer.is_none() {
                    log::info!("Ignoring unknown referral code {} for {}.", code, email);
                }
                referrer
            }
            None => None,
        };

        let own_code = Self::unique_referral_code(&mut tx).await?;
        let user = sqlx::query_as::<_, users::User>(
            r#"
                INSERT INTO users (id, email, username, password_hash, referral_code, referred_by, referral_rate_bp)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
            "#,
        )
        .bind(utils::new_id())
        .bind(email)
        .bind(username)
        .bind(password_hash)
        .bind(&own_code)
        .bind(referrer.as_ref().map(|r| r.referral_code.clone()))
        .bind(referrals::BASE_RATE_BP)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(referrer) = referrer {
            let update = ReferrerUpdate::after_signup(referrer.referral_count);

            sqlx::query(
                r#"
                    UPDATE users
                    SET referral_count = $1,
                        referral_rate_bp = $2,
                        pending_bonus_in_cents = pending_bonus_in_cents + $3,
                        updated_at = CURRENT_TIMESTAMP
                    WHERE id = $4
                "#,
            )
            .bind(update.referral_count)
            .bind(update.referral_rate_bp)
            .bind(update.bonus_in_cents)
            .bind(&referrer.id)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO referral_counts (id, user_id, referrer) VALUES ($1, $2, $3)")
                .bind(utils::new_id())
                .bind(&user.id)
                .bind(&referrer.referral_code)
                .execute(&mut *tx)
                .await?;

            log::info!(
                "User {} referred by {}: {} referrals, rate {} bp.",
                user.id,
                referrer.id,
                update.referral_count,
                update.referral_rate_bp
            );
        }

        tx.commit().await?;

        Ok(user)
    }

    async fn unique_referral_code(
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<String, RepositoryError> {
        for _ in 0..REFERRAL_CODE_ATTEMPTS {
            let code = utils::generate_referral_code();
            let taken: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE referral_code = $1)")
                    .bind(&code)
                    .fetch_one(&mut **tx)
                    .await?;

            if !taken {
                return Ok(code);
            }
        }

        Err(RepositoryError::Conflict(
            "Could not allocate a referral code".to_string(),
        ))
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<users::User>, RepositoryError> {
        let user = sqlx::query_as::<_, users::User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<users::User>, RepositoryError> {
        let user = sqlx::query_as::<_, users::User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    pub async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<users::User>, RepositoryError> {
        let users = sqlx::query_as::<_, users::User>(
            "SELECT * FROM users ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.conn)
        .await?;

        Ok(users)
    }

    pub async fn list_referrals(
        &self,
        referral_code: &str,
    ) -> Result<Vec<ReferralCount>, RepositoryError> {
        let referrals = sqlx::query_as::<_, ReferralCount>(
            "SELECT * FROM referral_counts WHERE referrer = $1 ORDER BY created_at DESC",
        )
        .bind(referral_code)
        .fetch_all(&self.conn)
        .await?;

        Ok(referrals)
    }

    pub async fn update_username(
        &self,
        user_id: &str,
        username: &str,
    ) -> Result<users::User, RepositoryError> {
        sqlx::query_as::<_, users::User>(
            "UPDATE users SET username = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
        )
        .bind(username)
        .bind(user_id)
        .fetch_optional(&self.conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("user {}", user_id)))
    }

    pub async fn set_mining_bot(
        &self,
        user_id: &str,
        enabled: bool,
    ) -> Result<users::User, RepositoryError> {
        sqlx::query_as::<_, users::User>(
            "UPDATE users SET mining_bot = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
        )
        .bind(enabled)
        .bind(user_id)
        .fetch_optional(&self.conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("user {}", user_id)))
    }

    pub async fn set_admin(&self, user_id: &str, is_admin: bool) -> Result<users::User, RepositoryError> {
        sqlx::query_as::<_, users::User>(
            "UPDATE users SET is_admin = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
        )
        .bind(is_admin)
        .bind(user_id)
        .fetch_optional(&self.conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("user {}", user_id)))
    }
}
