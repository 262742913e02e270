//! Sweeping tasks nobody is going to finish.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tollgate_config::VacuumConfig;
use tollgate_core::{Task, TaskStatus};
use tollgate_db::{CasOutcome, LedgerRepo};
use tracing::{info, warn};

use crate::SchedulerResult;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VacuumReport {
    pub examined: usize,
    /// New tasks no agent picked up in time.
    pub expired: usize,
    /// In-progress tasks that ran out of attempts.
    pub timed_out: usize,
    /// In-progress tasks put back in the queue.
    pub requeued: usize,
    /// Writes that failed; retried on the next sweep.
    pub errors: usize,
}

#[derive(Clone, Copy)]
enum Action {
    Expire,
    TimeOut,
    Requeue,
}

/// Fail or requeue stale tasks in the most recent checklists.
///
/// Only `New` and `InProgress` tasks are touched, each through a
/// compare-and-set, so running the sweep twice changes nothing more.
pub async fn vacuum(
    ledger: &dyn LedgerRepo,
    config: &VacuumConfig,
    now: DateTime<Utc>,
) -> SchedulerResult<VacuumReport> {
    let max_age = Duration::hours(config.new_task_max_age_hours);
    let timeout = Duration::minutes(config.in_progress_timeout_minutes);
    let expired_reason = format!(
        "No agent accepted this task in {}",
        describe_minutes(config.new_task_max_age_hours * 60)
    );
    let timed_out_reason = format!(
        "Task timed out after {}",
        describe_minutes(config.in_progress_timeout_minutes)
    );

    let mut report = VacuumReport::default();

    for full in ledger.latest_tasks(config.checklist_window).await? {
        let task = full.task;
        report.examined += 1;

        let action = match task.status {
            TaskStatus::New if now - task.create_timestamp > max_age => Action::Expire,
            TaskStatus::InProgress
                if task.start_timestamp.is_none_or(|started| now - started > timeout) =>
            {
                if task.has_attempts_left() {
                    Action::Requeue
                } else {
                    Action::TimeOut
                }
            }
            _ => continue,
        };

        let apply = |task: &mut Task| match action {
            Action::Expire => {
                task.transition(TaskStatus::Failed, now);
                task.reason = Some(expired_reason.clone());
            }
            Action::TimeOut => {
                task.transition(TaskStatus::Failed, now);
                task.reason = Some(timed_out_reason.clone());
            }
            Action::Requeue => {
                task.transition(TaskStatus::New, now);
                task.reason = None;
            }
        };

        match ledger.update_task_if(task.id, task.status, &apply).await {
            Ok(CasOutcome::Applied(updated)) => {
                info!(
                    task = %updated.name,
                    task_id = %updated.id,
                    commit = %full.checklist.commit.sha,
                    status = %updated.status,
                    "Vacuumed task"
                );
                match action {
                    Action::Expire => report.expired += 1,
                    Action::TimeOut => report.timed_out += 1,
                    Action::Requeue => report.requeued += 1,
                }
            }
            Ok(CasOutcome::Conflict(_)) => {}
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Failed to vacuum task");
                report.errors += 1;
            }
        }
    }

    Ok(report)
}

fn describe_minutes(minutes: i64) -> String {
    let (value, unit) = if minutes % (24 * 60) == 0 {
        (minutes / (24 * 60), "day")
    } else if minutes % 60 == 0 {
        (minutes / 60, "hour")
    } else {
        (minutes, "minute")
    };
    if value == 1 {
        format!("{value} {unit}")
    } else {
        format!("{value} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tollgate_core::CommitInfo;
    use tollgate_core::checklist::{AuthorInfo, NewChecklist};
    use tollgate_core::task::TaskTemplate;
    use tollgate_db::MemoryStore;

    fn config() -> VacuumConfig {
        VacuumConfig {
            checklist_window: 20,
            new_task_max_age_hours: 96,
            in_progress_timeout_minutes: 60,
        }
    }

    async fn single_task(store: &MemoryStore, created_at: DateTime<Utc>) -> Task {
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
                created_at.timestamp_millis(),
            )
            .await
            .unwrap();
        store.latest_tasks(1).await.unwrap().remove(0).task
    }

    #[rstest]
    #[case(96 * 60, "4 days")]
    #[case(60, "1 hour")]
    #[case(90, "90 minutes")]
    #[case(120, "2 hours")]
    fn test_describe_minutes(#[case] minutes: i64, #[case] expected: &str) {
        assert_eq!(describe_minutes(minutes), expected);
    }

    #[tokio::test]
    async fn test_expires_unclaimed_tasks() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let task = single_task(&store, now - Duration::days(5)).await;

        let report = vacuum(&store, &config(), now).await.unwrap();
        assert_eq!(report.expired, 1);

        let task = store.get_task(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(
            task.reason.as_deref(),
            Some("No agent accepted this task in 4 days")
        );
    }

    #[tokio::test]
    async fn test_requeues_then_times_out() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut task = single_task(&store, now - Duration::hours(3)).await;

        task.status = TaskStatus::InProgress;
        task.attempts = 1;
        task.start_timestamp = Some(now - Duration::hours(2));
        store.put_task(&task).await.unwrap();

        let report = vacuum(&store, &config(), now).await.unwrap();
        assert_eq!(report.requeued, 1);
        let requeued = store.get_task(task.id).await.unwrap();
        assert_eq!(requeued.status, TaskStatus::New);
        assert_eq!(requeued.start_timestamp, None);

        task.attempts = 2;
        store.put_task(&task).await.unwrap();

        let report = vacuum(&store, &config(), now).await.unwrap();
        assert_eq!(report.timed_out, 1);
        let failed = store.get_task(task.id).await.unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.reason.as_deref(), Some("Task timed out after 1 hour"));
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let store = MemoryStore::new();
        let now = Utc::now();
        single_task(&store, now - Duration::days(5)).await;

        let first = vacuum(&store, &config(), now).await.unwrap();
        let snapshot = store.latest_tasks(20).await.unwrap();
        let second = vacuum(&store, &config(), now).await.unwrap();

        assert_eq!(first.expired, 1);
        assert_eq!(second.expired + second.timed_out + second.requeued, 0);
        assert_eq!(store.latest_tasks(20).await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_fresh_tasks_untouched() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut task = single_task(&store, now - Duration::hours(1)).await;
        task.status = TaskStatus::InProgress;
        task.attempts = 1;
        task.start_timestamp = Some(now - Duration::minutes(10));
        store.put_task(&task).await.unwrap();

        let report = vacuum(&store, &config(), now).await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.requeued + report.timed_out + report.expired, 0);
    }
}
