//! Build statuses of the most recent checklists.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tollgate_core::build::compute_trend;
use tollgate_core::stage::group_by_stage;
use tollgate_core::{BuildResult, BuildStatus, ChecklistId, Error, Task};
use tollgate_db::LedgerRepo;

use crate::SchedulerResult;

/// Build status of each of the `window` most recent checklists, newest first.
pub async fn build_statuses(
    ledger: &dyn LedgerRepo,
    window: usize,
    now: DateTime<Utc>,
) -> SchedulerResult<Vec<BuildStatus>> {
    let checklists = ledger.latest_checklists(window).await?;

    let mut by_checklist: HashMap<ChecklistId, Vec<Task>> = HashMap::new();
    for full in ledger.latest_tasks(window).await? {
        by_checklist
            .entry(full.checklist.id)
            .or_default()
            .push(full.task);
    }

    Ok(checklists
        .into_iter()
        .map(|checklist| {
            let tasks = by_checklist.remove(&checklist.id).unwrap_or_default();
            BuildStatus::new(checklist, group_by_stage(tasks), now)
        })
        .collect())
}

/// The anticipated result of the next build.
pub async fn public_build_status(
    ledger: &dyn LedgerRepo,
    window: usize,
    now: DateTime<Utc>,
) -> SchedulerResult<BuildResult> {
    let statuses = build_statuses(ledger, window, now).await?;
    match compute_trend(&statuses) {
        BuildResult::New => {
            Err(Error::Invariant("build trend cannot be New".to_string()).into())
        }
        trend => Ok(trend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::checklist::{AuthorInfo, NewChecklist};
    use tollgate_core::task::TaskTemplate;
    use tollgate_core::{CommitInfo, TaskStatus};
    use tollgate_db::MemoryStore;

    fn commit(sha: &str) -> NewChecklist {
        NewChecklist {
            repository: "flutter/flutter".to_string(),
            commit: CommitInfo {
                sha: sha.to_string(),
                author: AuthorInfo::default(),
            },
            tasks: vec![
                TaskTemplate::new("cirrus", "cirrus", &["can-update-github"]),
                TaskTemplate::new("devicelab", "startup", &["android"]),
            ],
        }
    }

    async fn set_all(store: &MemoryStore, sha: &str, status: TaskStatus) {
        for full in store.latest_tasks(20).await.unwrap() {
            if full.checklist.commit.sha == sha {
                let mut task = full.task;
                task.transition(status, Utc::now());
                store.put_task(&task).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_empty_ledger_will_fail() {
        let store = MemoryStore::new();
        assert!(build_statuses(&store, 20, Utc::now()).await.unwrap().is_empty());
        assert_eq!(
            public_build_status(&store, 20, Utc::now()).await.unwrap(),
            BuildResult::WillFail
        );
    }

    #[tokio::test]
    async fn test_statuses_newest_first_with_stages() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .ingest(&[commit("c2"), commit("c1")], now.timestamp_millis())
            .await
            .unwrap();
        set_all(&store, "c1", TaskStatus::Succeeded).await;

        let statuses = build_statuses(&store, 20, now).await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].checklist.commit.sha, "c2");
        assert_eq!(statuses[0].result, BuildResult::InProgress);
        assert_eq!(statuses[0].stages[0].name, "cirrus");
        assert_eq!(statuses[1].result, BuildResult::Succeeded);

        assert_eq!(
            public_build_status(&store, 20, now).await.unwrap(),
            BuildResult::Succeeded
        );
    }

    #[tokio::test]
    async fn test_latest_failure_breaks_trend() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .ingest(&[commit("c2"), commit("c1")], now.timestamp_millis())
            .await
            .unwrap();
        set_all(&store, "c1", TaskStatus::Failed).await;

        assert_eq!(
            public_build_status(&store, 20, now).await.unwrap(),
            BuildResult::WillFail
        );
    }
}
