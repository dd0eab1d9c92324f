use crate::domain::session::Session;
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<()>;

    async fn find(&self, token: &str) -> Result<Option<Session>>;

    /// Drops every session that expired at or before `now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[derive(Debug)]
pub struct SqliteSessionRepository {
    pub pool: Arc<SqlitePool>,
}

impl SqliteSessionRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, session: &Session) -> Result<()> {
        sqlx::query("INSERT INTO user_tokens (token, username, expires_at) VALUES (?, ?, ?)")
            .bind(&session.token)
            .bind(&session.username)
            .bind(session.expires_at.timestamp_millis())
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn find(&self, token: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM user_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(self.pool.as_ref())
            .await?;
        Ok(session)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_tokens WHERE expires_at <= ?")
            .bind(now.timestamp_millis())
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}
