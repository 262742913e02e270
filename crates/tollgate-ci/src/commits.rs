//! Pulling new commits of the tracked repository into the ledger.

use chrono::{DateTime, Utc};
use tollgate_config::SystemConfig;
use tollgate_core::checklist::CommitSyncResult;
use tollgate_db::LedgerRepo;
use tollgate_scheduler::{ManifestSource, ingest_commits};

use crate::github::GitHubClient;
use crate::CiResult;

/// Fetch the latest commits from GitHub and ingest the unknown ones.
pub async fn refresh_commits(
    github: &GitHubClient,
    ledger: &dyn LedgerRepo,
    manifests: &dyn ManifestSource,
    config: &SystemConfig,
    now: DateTime<Utc>,
) -> CiResult<Vec<CommitSyncResult>> {
    let commits = github
        .commits(&config.repository, config.github.commit_batch_size)
        .await?;
    Ok(ingest_commits(ledger, manifests, config, &commits, now).await?)
}
