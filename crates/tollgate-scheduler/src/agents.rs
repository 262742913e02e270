//! Agent registry operations and operator task resets.

use chrono::{DateTime, Utc};
use tollgate_core::agent::{issue_token, verify_token};
use tollgate_core::stage::is_external_stage;
use tollgate_core::{Agent, Error, Task, TaskId, TaskStatus};
use tollgate_db::{AgentRepo, DbError, LedgerRepo};
use tracing::info;

use crate::{SchedulerError, SchedulerResult};

/// Register an agent. Returns the agent and its auth token.
///
/// The token is not stored; losing it means authorizing the agent again.
pub async fn create_agent(
    agents: &dyn AgentRepo,
    agent_id: &str,
    capabilities: Vec<String>,
) -> SchedulerResult<(Agent, String)> {
    if agent_id.trim().is_empty() {
        return Err(SchedulerError::invalid_input("agent id must not be empty"));
    }
    if capabilities.is_empty() {
        return Err(SchedulerError::invalid_input(
            "an agent needs at least one capability",
        ));
    }

    let issued = issue_token();
    let agent = Agent {
        agent_id: agent_id.to_string(),
        capabilities,
        is_healthy: false,
        health_details: String::new(),
        health_check_timestamp: None,
        auth_token_hash: issued.hash,
    };

    agents.create_agent(&agent).await.map_err(|e| match e {
        DbError::Duplicate(what) => Error::Conflict(format!("{what} already exists")).into(),
        other => SchedulerError::from(other),
    })?;

    info!(agent = %agent.agent_id, capabilities = ?agent.capabilities, "Created agent");
    Ok((agent, issued.token))
}

/// Issue a fresh token for an agent, invalidating the previous one.
pub async fn authorize_agent(agents: &dyn AgentRepo, agent_id: &str) -> SchedulerResult<String> {
    let issued = issue_token();
    agents.set_auth_token_hash(agent_id, &issued.hash).await?;

    info!(agent = %agent_id, "Refreshed agent token");
    Ok(issued.token)
}

/// Resolve the agent presenting `token`.
///
/// Unknown agents and wrong tokens are indistinguishable to the caller.
pub async fn authenticate_agent(
    agents: &dyn AgentRepo,
    agent_id: &str,
    token: &str,
) -> SchedulerResult<Agent> {
    let agent = match agents.get_agent(agent_id).await {
        Ok(agent) => agent,
        Err(DbError::NotFound(_)) => return Err(unauthorized(agent_id)),
        Err(e) => return Err(e.into()),
    };
    if !verify_token(&agent.auth_token_hash, token) {
        return Err(unauthorized(agent_id));
    }
    Ok(agent)
}

fn unauthorized(agent_id: &str) -> SchedulerError {
    Error::Unauthorized(format!("invalid credentials for agent {agent_id}")).into()
}

/// Record a health report. The agent's credentials are left as stored.
pub async fn update_agent_health(
    agents: &dyn AgentRepo,
    agent: &Agent,
    is_healthy: bool,
    health_details: String,
    now: DateTime<Utc>,
) -> SchedulerResult<Agent> {
    let updated = agents
        .update_health(&agent.agent_id, is_healthy, &health_details, now)
        .await?;
    Ok(updated)
}

/// Put an agent-run task back in the queue with a fresh attempt budget.
pub async fn reset_task(ledger: &dyn LedgerRepo, task_id: TaskId, now: DateTime<Utc>) -> SchedulerResult<Task> {
    let mut task = ledger.get_task(task_id).await?;
    if is_external_stage(&task.stage_name) {
        return Err(SchedulerError::invalid_input(format!(
            "task {task_id} belongs to external stage '{}'",
            task.stage_name
        )));
    }

    task.transition(TaskStatus::New, now);
    task.attempts = 0;
    task.reason = None;
    task.reserved_for_agent_id = None;
    ledger.put_task(&task).await?;

    info!(task = %task.name, task_id = %task.id, "Reset task");
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::CommitInfo;
    use tollgate_core::checklist::{AuthorInfo, NewChecklist};
    use tollgate_core::task::TaskTemplate;
    use tollgate_db::MemoryStore;

    fn caps() -> Vec<String> {
        vec!["has-android-device".to_string()]
    }

    #[tokio::test]
    async fn test_created_agent_authenticates() {
        let store = MemoryStore::new();
        let (agent, token) = create_agent(&store, "linux1", caps()).await.unwrap();
        assert!(!agent.auth_token_hash.contains(&token));

        let found = authenticate_agent(&store, "linux1", &token).await.unwrap();
        assert_eq!(found.agent_id, "linux1");

        let err = authenticate_agent(&store, "linux1", "nope").await.unwrap_err();
        assert!(matches!(err, SchedulerError::Domain(Error::Unauthorized(_))));
        let err = authenticate_agent(&store, "ghost", &token).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Domain(Error::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_authorize_invalidates_previous_token() {
        let store = MemoryStore::new();
        let (_, old_token) = create_agent(&store, "linux1", caps()).await.unwrap();
        let new_token = authorize_agent(&store, "linux1").await.unwrap();

        assert!(authenticate_agent(&store, "linux1", &old_token).await.is_err());
        assert!(authenticate_agent(&store, "linux1", &new_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_agent_is_conflict() {
        let store = MemoryStore::new();
        create_agent(&store, "linux1", caps()).await.unwrap();
        let err = create_agent(&store, "linux1", caps()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Domain(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_health_update_is_stored() {
        let store = MemoryStore::new();
        let (agent, _) = create_agent(&store, "linux1", caps()).await.unwrap();
        let now = Utc::now();
        update_agent_health(&store, &agent, true, "adb: ok".to_string(), now)
            .await
            .unwrap();

        let stored = store.get_agent("linux1").await.unwrap();
        assert!(stored.is_healthy);
        assert_eq!(stored.health_details, "adb: ok");
        assert_eq!(stored.health_check_timestamp, Some(now));
    }

    #[tokio::test]
    async fn test_health_report_keeps_refreshed_token() {
        let store = MemoryStore::new();
        let (_, old_token) = create_agent(&store, "linux1", caps()).await.unwrap();
        let authenticated = authenticate_agent(&store, "linux1", &old_token).await.unwrap();

        let new_token = authorize_agent(&store, "linux1").await.unwrap();
        update_agent_health(&store, &authenticated, true, "adb: ok".to_string(), Utc::now())
            .await
            .unwrap();

        assert!(authenticate_agent(&store, "linux1", &old_token).await.is_err());
        let agent = authenticate_agent(&store, "linux1", &new_token).await.unwrap();
        assert!(agent.is_healthy);
    }

    #[tokio::test]
    async fn test_reset_task_restores_attempt_budget() {
        let store = MemoryStore::new();
        store
            .ingest(
                &[NewChecklist {
                    repository: "flutter/flutter".to_string(),
                    commit: CommitInfo {
                        sha: "abc".to_string(),
                        author: AuthorInfo::default(),
                    },
                    tasks: vec![
                        TaskTemplate::new("devicelab", "startup", &["android"]),
                        TaskTemplate::new("cirrus", "cirrus", &["can-update-github"]),
                    ],
                }],
                1_000,
            )
            .await
            .unwrap();
        let tasks = store.latest_tasks(1).await.unwrap();
        let mut devicelab = tasks.iter().find(|t| t.task.name == "startup").unwrap().task.clone();
        let cirrus = tasks.iter().find(|t| t.task.name == "cirrus").unwrap().task.clone();

        devicelab.status = TaskStatus::Failed;
        devicelab.attempts = 2;
        devicelab.reason = Some("Task failed on agent".to_string());
        store.put_task(&devicelab).await.unwrap();

        let reset = reset_task(&store, devicelab.id, Utc::now()).await.unwrap();
        assert_eq!(reset.status, TaskStatus::New);
        assert_eq!(reset.attempts, 0);
        assert_eq!(reset.reason, None);

        assert!(reset_task(&store, cirrus.id, Utc::now()).await.is_err());
    }
}
