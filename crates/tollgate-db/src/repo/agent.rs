//! Agent registry storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tollgate_core::Agent;

use crate::{DbError, DbResult};

#[async_trait]
pub trait AgentRepo: Send + Sync {
    /// Register a new agent. Fails with `Duplicate` if the id is taken.
    async fn create_agent(&self, agent: &Agent) -> DbResult<()>;

    async fn get_agent(&self, agent_id: &str) -> DbResult<Agent>;

    /// Replace the stored token hash. Only token refresh writes this column.
    async fn set_auth_token_hash(&self, agent_id: &str, auth_token_hash: &str) -> DbResult<()>;

    /// Record a health report, leaving every other column alone.
    async fn update_health(
        &self,
        agent_id: &str,
        is_healthy: bool,
        health_details: &str,
        checked_at: DateTime<Utc>,
    ) -> DbResult<Agent>;

    /// All agents ordered by id.
    async fn list_agents(&self) -> DbResult<Vec<Agent>>;
}

#[derive(Debug, sqlx::FromRow)]
struct AgentRow {
    agent_id: String,
    capabilities: Vec<String>,
    is_healthy: bool,
    health_details: String,
    health_check_timestamp: Option<DateTime<Utc>>,
    auth_token_hash: String,
}

impl From<AgentRow> for Agent {
    fn from(row: AgentRow) -> Self {
        Agent {
            agent_id: row.agent_id,
            capabilities: row.capabilities,
            is_healthy: row.is_healthy,
            health_details: row.health_details,
            health_check_timestamp: row.health_check_timestamp,
            auth_token_hash: row.auth_token_hash,
        }
    }
}

/// PostgreSQL implementation of AgentRepo.
pub struct PgAgentRepo {
    pool: PgPool,
}

impl PgAgentRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepo for PgAgentRepo {
    async fn create_agent(&self, agent: &Agent) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO agents (agent_id, capabilities, is_healthy, health_details,
                                health_check_timestamp, auth_token_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (agent_id) DO NOTHING
            "#,
        )
        .bind(&agent.agent_id)
        .bind(&agent.capabilities)
        .bind(agent.is_healthy)
        .bind(&agent.health_details)
        .bind(agent.health_check_timestamp)
        .bind(&agent.auth_token_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Duplicate(format!("agent {}", agent.agent_id)));
        }
        Ok(())
    }

    async fn get_agent(&self, agent_id: &str) -> DbResult<Agent> {
        sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT agent_id, capabilities, is_healthy, health_details,
                   health_check_timestamp, auth_token_hash
            FROM agents
            WHERE agent_id = $1
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Agent::from)
        .ok_or_else(|| DbError::NotFound(format!("agent {agent_id}")))
    }

    async fn set_auth_token_hash(&self, agent_id: &str, auth_token_hash: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE agents SET auth_token_hash = $2 WHERE agent_id = $1")
            .bind(agent_id)
            .bind(auth_token_hash)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("agent {agent_id}")));
        }
        Ok(())
    }

    async fn update_health(
        &self,
        agent_id: &str,
        is_healthy: bool,
        health_details: &str,
        checked_at: DateTime<Utc>,
    ) -> DbResult<Agent> {
        sqlx::query_as::<_, AgentRow>(
            r#"
            UPDATE agents
            SET is_healthy = $2, health_details = $3, health_check_timestamp = $4
            WHERE agent_id = $1
            RETURNING agent_id, capabilities, is_healthy, health_details,
                      health_check_timestamp, auth_token_hash
            "#,
        )
        .bind(agent_id)
        .bind(is_healthy)
        .bind(health_details)
        .bind(checked_at)
        .fetch_optional(&self.pool)
        .await?
        .map(Agent::from)
        .ok_or_else(|| DbError::NotFound(format!("agent {agent_id}")))
    }

    async fn list_agents(&self) -> DbResult<Vec<Agent>> {
        let rows = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT agent_id, capabilities, is_healthy, health_details,
                   health_check_timestamp, auth_token_hash
            FROM agents
            ORDER BY agent_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Agent::from).collect())
    }
}
