use crate::models::users;
use crate::utils;

use sqlx::PgPool;

use super::RepositoryError;

#[derive(Clone)]
pub struct SessionRepository {
    conn: PgPool,
}

impl SessionRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        ttl: chrono::Duration,
    ) -> Result<users::Session, RepositoryError> {
        let now = chrono::Utc::now().naive_utc();

        let session = sqlx::query_as::<_, users::Session>(
            r#"
                INSERT INTO sessions (token, user_id, created_at, expires_at)
                VALUES ($1, $2, $3, $4)
                RETURNING *
            "#,
        )
        .bind(utils::generate_session_token())
        .bind(user_id)
        .bind(now)
        .bind(now + ttl)
        .fetch_one(&self.conn)
        .await?;

        Ok(session)
    }

    pub async fn get_user_by_token(&self, token: &str) -> Result<Option<users::User>, RepositoryError> {
        let user = sqlx::query_as::<_, users::User>(
            r#"
                SELECT u.* FROM sessions s
                JOIN users u ON u.id = s.user_id
                WHERE s.token = $1 AND s.expires_at > $2
            "#,
        )
        .bind(token)
        .bind(chrono::Utc::now().naive_utc())
        .fetch_optional(&self.conn)
        .await?;

        Ok(user)
    }

    pub async fn delete_session(&self, token: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.conn)
            .await?;

        Ok(())
    }

    pub async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(chrono::Utc::now().naive_utc())
            .execute(&self.conn)
            .await?;

        Ok(result.rows_affected())
    }
}
