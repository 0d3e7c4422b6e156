use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::ConnectionPool;
use crate::models::{NewUser, ProfileChanges, User};
use crate::repository::UserRepository;
use crate::utils::error::{AppError, AppResult};

pub struct PgUserRepository {
    db: ConnectionPool,
}

impl PgUserRepository {
    pub fn new(db: ConnectionPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewUser) -> AppResult<User> {
        let user = User::from_new(user, Utc::now());
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(self.db.inner_ref())
        .await?;

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.db.inner_ref())
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(self.db.inner_ref())
            .await?;
        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                avatar = COALESCE($3, avatar),
                bio = COALESCE($4, bio),
                location = COALESCE($5, location),
                website = COALESCE($6, website),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.avatar)
        .bind(changes.bio)
        .bind(changes.location)
        .bind(changes.website)
        .fetch_optional(self.db.inner_ref())
        .await?;

        user.ok_or_else(|| AppError::NotFound(format!("User '{id}' was not found")))
    }
}
