use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::db::{StoreError, StoreResult};

/// Globally named label shared across contacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[async_trait]
pub trait TagStore: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<Tag>>;
    /// `AlreadyExists` on a duplicate name.
    async fn create(&self, name: &str) -> StoreResult<Tag>;
    /// `NotFound` when no tag has this id. Contact associations cascade.
    async fn delete(&self, id: i64) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct PgTagStore {
    db: PgPool,
}

impl PgTagStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TagStore for PgTagStore {
    async fn list(&self) -> StoreResult<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags ORDER BY name, id")
            .fetch_all(&self.db)
            .await?;
        Ok(tags)
    }

    async fn create(&self, name: &str) -> StoreResult<Tag> {
        let tag = sqlx::query_as::<_, Tag>(
            r#"
            INSERT INTO tags (name)
            VALUES ($1)
            RETURNING id, name
            "#,
        )
        .bind(name)
        .fetch_one(&self.db)
        .await?;
        Ok(tag)
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        let res = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
