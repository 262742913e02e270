//! Recording results reported by agents.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tollgate_core::{Agent, Error, Task, TaskId, TaskStatus};
use tollgate_db::{BenchmarkRepo, BenchmarkValue, CasOutcome, LedgerRepo};
use tracing::info;

use crate::{SchedulerError, SchedulerResult};

/// Reason recorded when a task exhausts its attempts.
pub const FAILED_ON_AGENT: &str = "Task failed on agent";

/// The result of a task as reported by the agent that ran it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskOutcome {
    #[serde(rename = "TaskKey")]
    pub task_id: TaskId,
    /// Either `Succeeded` or `Failed`.
    pub new_status: TaskStatus,
    #[serde(default)]
    pub result_data: Map<String, Value>,
    /// Keys of `result_data` holding benchmark scores.
    #[serde(default)]
    pub benchmark_score_keys: Vec<String>,
}

/// Apply an agent's report to its task.
///
/// A failure with attempts left puts the task back in the queue; otherwise
/// the task fails for good. Benchmark scores of a successful run are
/// validated before anything is written. Only tasks still in progress accept
/// a report.
pub async fn report_task_outcome(
    ledger: &dyn LedgerRepo,
    benchmarks: &dyn BenchmarkRepo,
    agent: &Agent,
    outcome: TaskOutcome,
    now: DateTime<Utc>,
) -> SchedulerResult<Task> {
    let new_status = outcome.new_status;
    if !matches!(new_status, TaskStatus::Succeeded | TaskStatus::Failed) {
        return Err(SchedulerError::invalid_input(
            "NewStatus can be one of 'Succeeded', 'Failed'",
        ));
    }

    let task = ledger.get_task(outcome.task_id).await?;
    if task.reserved_for_agent_id.as_deref() != Some(agent.agent_id.as_str()) {
        return Err(Error::Forbidden(format!(
            "task {} is not reserved for agent {}",
            task.id, agent.agent_id
        ))
        .into());
    }
    if task.status != TaskStatus::InProgress {
        return Err(Error::Conflict(format!(
            "task {} is {}, not in progress",
            task.id, task.status
        ))
        .into());
    }

    let scores = if new_status == TaskStatus::Succeeded {
        benchmark_scores(&outcome)?
    } else {
        Vec::new()
    };

    let apply = |task: &mut Task| match new_status {
        TaskStatus::Failed if task.has_attempts_left() => {
            task.transition(TaskStatus::New, now);
            task.reason = None;
        }
        TaskStatus::Failed => {
            task.transition(TaskStatus::Failed, now);
            task.reason = Some(FAILED_ON_AGENT.to_string());
        }
        status => {
            task.transition(status, now);
            task.reason = None;
        }
    };

    let updated = match ledger.update_task_if(task.id, TaskStatus::InProgress, &apply).await? {
        CasOutcome::Applied(updated) => updated,
        CasOutcome::Conflict(found) => {
            return Err(Error::Conflict(format!(
                "task {} changed to {found} while the report was processed",
                task.id
            ))
            .into());
        }
    };

    info!(
        task = %updated.name,
        task_id = %updated.id,
        agent = %agent.agent_id,
        reported = %new_status,
        status = %updated.status,
        "Recorded task outcome"
    );

    if !scores.is_empty() {
        let checklist = ledger.get_checklist(updated.checklist_id).await?;
        let values: Vec<BenchmarkValue> = scores
            .into_iter()
            .map(|(score_key, value)| BenchmarkValue {
                task_name: updated.name.clone(),
                score_key,
                commit_sha: checklist.commit.sha.clone(),
                task_id: updated.id,
                value,
                create_timestamp: now,
            })
            .collect();
        benchmarks.record_benchmarks(&values).await?;
    }

    Ok(updated)
}

fn benchmark_scores(outcome: &TaskOutcome) -> SchedulerResult<Vec<(String, f64)>> {
    outcome
        .benchmark_score_keys
        .iter()
        .map(|key| {
            outcome
                .result_data
                .get(key)
                .and_then(Value::as_f64)
                .map(|value| (key.clone(), value))
                .ok_or_else(|| {
                    SchedulerError::invalid_input(format!(
                        "benchmark score '{key}' is missing from the result data or not a number"
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tollgate_core::CommitInfo;
    use tollgate_core::checklist::{AuthorInfo, NewChecklist};
    use tollgate_core::task::TaskTemplate;
    use tollgate_db::MemoryStore;

    use crate::reserve_task;

    fn agent(id: &str) -> Agent {
        Agent {
            agent_id: id.to_string(),
            capabilities: vec!["android".to_string()],
            is_healthy: true,
            health_details: String::new(),
            health_check_timestamp: None,
            auth_token_hash: String::new(),
        }
    }

    async fn reserved_task(store: &MemoryStore, agent: &Agent) -> Task {
        store
            .ingest(
                &[NewChecklist {
                    repository: "flutter/flutter".to_string(),
                    commit: CommitInfo {
                        sha: "abc".to_string(),
                        author: AuthorInfo::default(),
                    },
                    tasks: vec![TaskTemplate::new("devicelab", "startup", &["android"])],
                }],
                1_000,
            )
            .await
            .unwrap();
        reserve_task(store, agent, 20, Utc::now())
            .await
            .unwrap()
            .unwrap()
            .task
    }

    fn outcome(task_id: TaskId, status: TaskStatus) -> TaskOutcome {
        TaskOutcome {
            task_id,
            new_status: status,
            result_data: Map::new(),
            benchmark_score_keys: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_failure_is_retried_once_then_final() {
        let store = MemoryStore::new();
        let agent = agent("a1");
        let task = reserved_task(&store, &agent).await;

        let updated = report_task_outcome(&store, &store, &agent, outcome(task.id, TaskStatus::Failed), Utc::now())
            .await
            .unwrap();
        assert_eq!(updated.status, TaskStatus::New);
        assert_eq!(updated.start_timestamp, None);

        let again = reserve_task(&store, &agent, 20, Utc::now()).await.unwrap().unwrap();
        assert_eq!(again.task.attempts, 2);

        let updated = report_task_outcome(&store, &store, &agent, outcome(task.id, TaskStatus::Failed), Utc::now())
            .await
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Failed);
        assert_eq!(updated.reason.as_deref(), Some(FAILED_ON_AGENT));
        assert!(updated.end_timestamp.is_some());
    }

    #[tokio::test]
    async fn test_success_records_benchmarks() {
        let store = MemoryStore::new();
        let agent = agent("a1");
        let task = reserved_task(&store, &agent).await;

        let mut report = outcome(task.id, TaskStatus::Succeeded);
        report.result_data = json!({ "startup_ms": 412.5, "note": "ok" })
            .as_object()
            .cloned()
            .unwrap();
        report.benchmark_score_keys = vec!["startup_ms".to_string()];

        let updated = report_task_outcome(&store, &store, &agent, report, Utc::now())
            .await
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Succeeded);

        let recorded = store.benchmarks().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].task_name, "startup");
        assert_eq!(recorded[0].score_key, "startup_ms");
        assert_eq!(recorded[0].commit_sha, "abc");
        assert_eq!(recorded[0].value, 412.5);
    }

    #[tokio::test]
    async fn test_non_numeric_score_rejected_before_writing() {
        let store = MemoryStore::new();
        let agent = agent("a1");
        let task = reserved_task(&store, &agent).await;

        let mut report = outcome(task.id, TaskStatus::Succeeded);
        report.result_data = json!({ "note": "ok" }).as_object().cloned().unwrap();
        report.benchmark_score_keys = vec!["note".to_string()];

        let err = report_task_outcome(&store, &store, &agent, report, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Domain(Error::InvalidInput(_))));
        assert_eq!(store.get_task(task.id).await.unwrap().status, TaskStatus::InProgress);
        assert!(store.benchmarks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_late_report_does_not_reopen_finished_task() {
        let store = MemoryStore::new();
        let agent = agent("a1");
        let task = reserved_task(&store, &agent).await;

        report_task_outcome(&store, &store, &agent, outcome(task.id, TaskStatus::Succeeded), Utc::now())
            .await
            .unwrap();
        let err = report_task_outcome(&store, &store, &agent, outcome(task.id, TaskStatus::Failed), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::Domain(Error::Conflict(_))));
        assert_eq!(store.get_task(task.id).await.unwrap().status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_report_after_requeue_is_rejected() {
        let store = MemoryStore::new();
        let agent = agent("a1");
        let mut task = reserved_task(&store, &agent).await;

        task.transition(TaskStatus::New, Utc::now());
        store.put_task(&task).await.unwrap();

        let err = report_task_outcome(&store, &store, &agent, outcome(task.id, TaskStatus::Failed), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Domain(Error::Conflict(_))));

        let stored = store.get_task(task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::New);
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn test_other_agent_cannot_report() {
        let store = MemoryStore::new();
        let task = reserved_task(&store, &agent("a1")).await;

        let err = report_task_outcome(&store, &store, &agent("a2"), outcome(task.id, TaskStatus::Succeeded), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Domain(Error::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_only_final_outcomes_accepted() {
        let store = MemoryStore::new();
        let agent = agent("a1");
        let task = reserved_task(&store, &agent).await;

        let err = report_task_outcome(&store, &store, &agent, outcome(task.id, TaskStatus::Skipped), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Domain(Error::InvalidInput(_))));
    }
}
