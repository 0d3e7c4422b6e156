use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::ConnectionPool;
use crate::models::Session;
use crate::repository::SessionRepository;
use crate::utils::error::AppResult;

pub struct PgSessionRepository {
    db: ConnectionPool,
}

impl PgSessionRepository {
    pub fn new(db: ConnectionPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> AppResult<Session> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(expires_at)
        .bind(Utc::now())
        .fetch_one(self.db.inner_ref())
        .await?;

        Ok(session)
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(self.db.inner_ref())
            .await?;
        Ok(session)
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(self.db.inner_ref())
            .await?;
        Ok(())
    }
}
