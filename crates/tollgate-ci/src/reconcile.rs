//! Mirroring external CI results onto ledger tasks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tollgate_db::LedgerRepo;
use tracing::{debug, info, warn};

use crate::provider::{CiProvider, ExternalResult, fold_results};
use crate::CiResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub examined: usize,
    pub updated: usize,
    /// Writes that failed; the sweep continued past them.
    pub errors: usize,
}

/// Bring tasks named after `provider.task_name()` in the latest `window`
/// checklists in line with what the provider reports.
///
/// A failed fetch abandons the cycle before anything is written. A failed
/// write is logged and counted, and the remaining tasks are still updated.
pub async fn reconcile(
    provider: &dyn CiProvider,
    ledger: &dyn LedgerRepo,
    window: usize,
    now: DateTime<Utc>,
) -> CiResult<ReconcileReport> {
    let tasks = ledger
        .latest_tasks_by_name(provider.task_name(), window)
        .await?;
    if tasks.is_empty() {
        debug!(provider = provider.name(), task = provider.task_name(), "No tasks to reconcile");
        return Ok(ReconcileReport::default());
    }

    let commits: Vec<String> = tasks
        .iter()
        .map(|t| t.checklist.commit.sha.clone())
        .collect();
    let results = provider.fetch(&commits).await?;

    let mut by_commit: HashMap<&str, Vec<&ExternalResult>> = HashMap::new();
    for result in &results {
        by_commit.entry(result.commit.as_str()).or_default().push(result);
    }

    let mut report = ReconcileReport {
        examined: tasks.len(),
        ..ReconcileReport::default()
    };
    for full in tasks {
        let Some(commit_results) = by_commit.get(full.checklist.commit.sha.as_str()) else {
            continue;
        };
        let Some(status) = fold_results(provider, commit_results.iter().copied()) else {
            continue;
        };
        if status == full.task.status {
            continue;
        }

        let mut task = full.task;
        let previous = task.status;
        task.transition(status, now);
        task.reason = Some(format!("reported by {}", provider.name()));
        if let Err(e) = ledger.put_task(&task).await {
            warn!(
                provider = provider.name(),
                task_id = %task.id,
                error = %e,
                "Failed to store reconciled task"
            );
            report.errors += 1;
            continue;
        }
        report.updated += 1;
        info!(
            provider = provider.name(),
            task = %task.name,
            commit = %full.checklist.commit.sha,
            from = %previous,
            to = %status,
            "Reconciled task"
        );
    }

    Ok(report)
}
