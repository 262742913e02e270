//! Cache of build results already pushed to the code-review system.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::DbResult;

/// Builder name used for the repository-wide trend.
pub const GLOBAL_BUILDER: &str = "global";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCacheKey {
    /// e.g. "github" or "buildbucket".
    pub provider: String,
    pub builder: String,
    pub commit_sha: String,
}

impl StatusCacheKey {
    pub fn new(
        provider: impl Into<String>,
        builder: impl Into<String>,
        commit_sha: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            builder: builder.into(),
            commit_sha: commit_sha.into(),
        }
    }

    /// Key for the repository-wide trend pushed by `provider`.
    pub fn global(provider: impl Into<String>, commit_sha: impl Into<String>) -> Self {
        Self::new(provider, GLOBAL_BUILDER, commit_sha)
    }
}

#[async_trait]
pub trait StatusCacheRepo: Send + Sync {
    /// Last value recorded for `key`, if any.
    async fn get_status(&self, key: &StatusCacheKey) -> DbResult<Option<String>>;

    async fn set_status(&self, key: &StatusCacheKey, value: &str) -> DbResult<()>;
}

/// PostgreSQL implementation of StatusCacheRepo.
pub struct PgStatusCacheRepo {
    pool: PgPool,
}

impl PgStatusCacheRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusCacheRepo for PgStatusCacheRepo {
    async fn get_status(&self, key: &StatusCacheKey) -> DbResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT result FROM build_status_cache
            WHERE provider = $1 AND builder = $2 AND commit_sha = $3
            "#,
        )
        .bind(&key.provider)
        .bind(&key.builder)
        .bind(&key.commit_sha)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(result,)| result))
    }

    async fn set_status(&self, key: &StatusCacheKey, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO build_status_cache (provider, builder, commit_sha, result, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (provider, builder, commit_sha)
            DO UPDATE SET result = EXCLUDED.result, updated_at = NOW()
            "#,
        )
        .bind(&key.provider)
        .bind(&key.builder)
        .bind(&key.commit_sha)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
