use async_trait::async_trait;

use super::ConnectionPool;
use crate::models::Category;
use crate::repository::CategoryRepository;
use crate::utils::error::AppResult;

pub struct PgCategoryRepository {
    db: ConnectionPool,
}

impl PgCategoryRepository {
    pub fn new(db: ConnectionPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CategoryRepository for PgCategoryRepository {
    async fn list(&self) -> AppResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name")
            .fetch_all(self.db.inner_ref())
            .await?;
        Ok(categories)
    }
}
