//! Benchmark values reported alongside successful tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tollgate_core::TaskId;

use crate::DbResult;

/// One score of one benchmark for one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkValue {
    pub task_name: String,
    pub score_key: String,
    pub commit_sha: String,
    pub task_id: TaskId,
    pub value: f64,
    pub create_timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait BenchmarkRepo: Send + Sync {
    async fn record_benchmarks(&self, values: &[BenchmarkValue]) -> DbResult<()>;
}

/// PostgreSQL implementation of BenchmarkRepo.
pub struct PgBenchmarkRepo {
    pool: PgPool,
}

impl PgBenchmarkRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BenchmarkRepo for PgBenchmarkRepo {
    async fn record_benchmarks(&self, values: &[BenchmarkValue]) -> DbResult<()> {
        if values.is_empty() {
            return Ok(());
        }

        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO benchmark_values (id, task_name, score_key, commit_sha, task_id, value, create_timestamp) ",
        );
        query_builder.push_values(values.iter(), |mut b, value| {
            b.push_bind(uuid::Uuid::now_v7())
                .push_bind(&value.task_name)
                .push_bind(&value.score_key)
                .push_bind(&value.commit_sha)
                .push_bind(*value.task_id.as_uuid())
                .push_bind(value.value)
                .push_bind(value.create_timestamp);
        });

        query_builder.build().execute(&self.pool).await?;
        Ok(())
    }
}
