//! Turning commits of the tracked repository into checklists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tollgate_config::SystemConfig;
use tollgate_core::CommitInfo;
use tollgate_core::checklist::{CommitSyncResult, NewChecklist, SyncOutcome};
use tollgate_core::task::TaskTemplate;
use tollgate_db::LedgerRepo;
use tracing::{debug, info};

use crate::SchedulerResult;

/// Source of the task manifest checked in at a commit.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Task templates declared at `sha`; empty when the commit has no manifest.
    async fn tasks_at(&self, sha: &str) -> SchedulerResult<Vec<TaskTemplate>>;
}

/// A source for repositories without manifests.
pub struct NoManifests;

#[async_trait]
impl ManifestSource for NoManifests {
    async fn tasks_at(&self, _sha: &str) -> SchedulerResult<Vec<TaskTemplate>> {
        Ok(Vec::new())
    }
}

/// Ingest `commits`, ordered newest first as the commit source lists them.
///
/// Commits are written in batches of `github.commit_batch_size`, one
/// transaction per batch. Already known commits are reported as skipped
/// without fetching their manifest. The ordering key starts at `now` and
/// decreases by one for each synced commit, so sorting by it reproduces the
/// order of `commits`.
pub async fn ingest_commits(
    ledger: &dyn LedgerRepo,
    manifests: &dyn ManifestSource,
    config: &SystemConfig,
    commits: &[CommitInfo],
    now: DateTime<Utc>,
) -> SchedulerResult<Vec<CommitSyncResult>> {
    let mut results = Vec::with_capacity(commits.len());
    let mut timestamp = now.timestamp_millis();

    for chunk in commits.chunks(config.github.commit_batch_size.max(1)) {
        let mut batch = Vec::with_capacity(chunk.len());
        for commit in chunk {
            let tasks = if ledger
                .find_checklist(&config.repository, &commit.sha)
                .await?
                .is_some()
            {
                Vec::new()
            } else {
                let extra = manifests.tasks_at(&commit.sha).await?;
                debug!(commit = %commit.sha, extra = extra.len(), "Resolved task list");
                merge_tasks(&config.tasks, extra)
            };
            batch.push(NewChecklist {
                repository: config.repository.clone(),
                commit: commit.clone(),
                tasks,
            });
        }

        let chunk_results = ledger.ingest(&batch, timestamp).await?;
        let synced = chunk_results
            .iter()
            .filter(|r| r.outcome == SyncOutcome::Synced)
            .count();
        timestamp -= synced as i64;
        results.extend(chunk_results);
    }

    let synced = results
        .iter()
        .filter(|r| r.outcome == SyncOutcome::Synced)
        .count();
    info!(
        repository = %config.repository,
        synced,
        skipped = results.len() - synced,
        "Ingested commits"
    );
    Ok(results)
}

/// Default tasks followed by manifest tasks; a manifest entry replaces the
/// default with the same stage and name.
fn merge_tasks(defaults: &[TaskTemplate], extra: Vec<TaskTemplate>) -> Vec<TaskTemplate> {
    let mut tasks: Vec<TaskTemplate> = defaults
        .iter()
        .filter(|d| {
            !extra
                .iter()
                .any(|e| e.stage_name == d.stage_name && e.name == d.name)
        })
        .cloned()
        .collect();
    tasks.extend(extra);
    tasks
}
