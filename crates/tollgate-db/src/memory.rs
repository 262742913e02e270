//! In-memory implementation of every repository trait.
//!
//! One lock guards the whole state, so compare-and-set and batch ingestion
//! are atomic. Used by tests and by `--in-memory` local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tollgate_core::checklist::{CommitSyncResult, NewChecklist, SyncOutcome};
use tollgate_core::{Agent, Checklist, ChecklistId, FullTask, Task, TaskId, TaskStatus};

use crate::repo::ledger::assemble_full_tasks;
use crate::{
    AgentRepo, BenchmarkRepo, BenchmarkValue, CasOutcome, DbError, DbResult, LedgerRepo,
    StatusCacheKey, StatusCacheRepo, TaskMutation,
};

/// Thread-safe in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    checklists: HashMap<ChecklistId, Checklist>,
    tasks: HashMap<TaskId, Task>,
    agents: BTreeMap<String, Agent>,
    status_cache: HashMap<StatusCacheKey, String>,
    benchmarks: Vec<BenchmarkValue>,
}

fn poisoned<T>(err: PoisonError<T>) -> DbError {
    DbError::InvalidData(format!("memory store lock poisoned: {err}"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Benchmark values recorded so far, in insertion order.
    pub fn benchmarks(&self) -> DbResult<Vec<BenchmarkValue>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.benchmarks.clone())
    }
}

impl MemoryState {
    fn find_checklist(&self, repository: &str, sha: &str) -> Option<&Checklist> {
        self.checklists
            .values()
            .find(|c| c.repository == repository && c.commit.sha == sha)
    }

    fn latest_checklists(&self, limit: usize) -> Vec<Checklist> {
        let mut checklists: Vec<Checklist> = self.checklists.values().cloned().collect();
        checklists.sort_by(|a, b| b.create_timestamp.cmp(&a.create_timestamp));
        checklists.truncate(limit);
        checklists
    }

    fn tasks_for_checklist(&self, id: ChecklistId) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| t.checklist_id == id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| (&a.stage_name, &a.name).cmp(&(&b.stage_name, &b.name)));
        tasks
    }

    fn full_tasks(&self, window: usize, name: Option<&str>) -> Vec<FullTask> {
        let checklists = self.latest_checklists(window);
        let by_checklist = checklists
            .iter()
            .map(|c| {
                let mut tasks = self.tasks_for_checklist(c.id);
                if let Some(name) = name {
                    tasks.retain(|t| t.name == name);
                }
                (c.id, tasks)
            })
            .collect();
        assemble_full_tasks(&checklists, by_checklist)
    }
}

#[async_trait]
impl LedgerRepo for MemoryStore {
    async fn ingest(
        &self,
        batch: &[NewChecklist],
        start_timestamp: i64,
    ) -> DbResult<Vec<CommitSyncResult>> {
        let mut state = self.state.write().map_err(poisoned)?;
        let mut results = Vec::with_capacity(batch.len());
        let mut timestamp = start_timestamp;

        for new in batch {
            if state.find_checklist(&new.repository, &new.commit.sha).is_some() {
                results.push(CommitSyncResult {
                    commit: new.commit.sha.clone(),
                    outcome: SyncOutcome::Skipped,
                });
                continue;
            }

            let checklist = Checklist {
                id: ChecklistId::new(),
                repository: new.repository.clone(),
                commit: new.commit.clone(),
                create_timestamp: timestamp,
            };
            let created_at = checklist.created_at();
            for template in &new.tasks {
                let task = Task::from_template(checklist.id, template, created_at);
                state.tasks.insert(task.id, task);
            }
            state.checklists.insert(checklist.id, checklist);

            results.push(CommitSyncResult {
                commit: new.commit.sha.clone(),
                outcome: SyncOutcome::Synced,
            });
            timestamp -= 1;
        }

        Ok(results)
    }

    async fn latest_checklists(&self, limit: usize) -> DbResult<Vec<Checklist>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.latest_checklists(limit))
    }

    async fn get_checklist(&self, id: ChecklistId) -> DbResult<Checklist> {
        let state = self.state.read().map_err(poisoned)?;
        state
            .checklists
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("checklist {id}")))
    }

    async fn find_checklist(&self, repository: &str, sha: &str) -> DbResult<Option<Checklist>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.find_checklist(repository, sha).cloned())
    }

    async fn tasks_for_checklist(&self, id: ChecklistId) -> DbResult<Vec<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.tasks_for_checklist(id))
    }

    async fn get_task(&self, id: TaskId) -> DbResult<Task> {
        let state = self.state.read().map_err(poisoned)?;
        state
            .tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("task {id}")))
    }

    async fn put_task(&self, task: &Task) -> DbResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        match state.tasks.get_mut(&task.id) {
            Some(stored) => {
                *stored = task.clone();
                Ok(())
            }
            None => Err(DbError::NotFound(format!("task {}", task.id))),
        }
    }

    async fn update_task_if(
        &self,
        id: TaskId,
        expected: TaskStatus,
        apply: &TaskMutation<'_>,
    ) -> DbResult<CasOutcome> {
        let mut state = self.state.write().map_err(poisoned)?;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("task {id}")))?;

        if task.status != expected {
            return Ok(CasOutcome::Conflict(task.status));
        }
        apply(task);
        Ok(CasOutcome::Applied(task.clone()))
    }

    async fn latest_tasks(&self, window: usize) -> DbResult<Vec<FullTask>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.full_tasks(window, None))
    }

    async fn latest_tasks_by_name(&self, name: &str, window: usize) -> DbResult<Vec<FullTask>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.full_tasks(window, Some(name)))
    }
}

#[async_trait]
impl AgentRepo for MemoryStore {
    async fn create_agent(&self, agent: &Agent) -> DbResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        if state.agents.contains_key(&agent.agent_id) {
            return Err(DbError::Duplicate(format!("agent {}", agent.agent_id)));
        }
        state.agents.insert(agent.agent_id.clone(), agent.clone());
        Ok(())
    }

    async fn get_agent(&self, agent_id: &str) -> DbResult<Agent> {
        let state = self.state.read().map_err(poisoned)?;
        state
            .agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("agent {agent_id}")))
    }

    async fn set_auth_token_hash(&self, agent_id: &str, auth_token_hash: &str) -> DbResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let agent = state
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| DbError::NotFound(format!("agent {agent_id}")))?;
        agent.auth_token_hash = auth_token_hash.to_string();
        Ok(())
    }

    async fn update_health(
        &self,
        agent_id: &str,
        is_healthy: bool,
        health_details: &str,
        checked_at: DateTime<Utc>,
    ) -> DbResult<Agent> {
        let mut state = self.state.write().map_err(poisoned)?;
        let agent = state
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| DbError::NotFound(format!("agent {agent_id}")))?;
        agent.is_healthy = is_healthy;
        agent.health_details = health_details.to_string();
        agent.health_check_timestamp = Some(checked_at);
        Ok(agent.clone())
    }

    async fn list_agents(&self) -> DbResult<Vec<Agent>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.agents.values().cloned().collect())
    }
}

#[async_trait]
impl StatusCacheRepo for MemoryStore {
    async fn get_status(&self, key: &StatusCacheKey) -> DbResult<Option<String>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.status_cache.get(key).cloned())
    }

    async fn set_status(&self, key: &StatusCacheKey, value: &str) -> DbResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.status_cache.insert(key.clone(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl BenchmarkRepo for MemoryStore {
    async fn record_benchmarks(&self, values: &[BenchmarkValue]) -> DbResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.benchmarks.extend_from_slice(values);
        Ok(())
    }
}
