//! Pushing build results to open pull requests.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tollgate_config::{BuilderConfig, SystemConfig};
use tollgate_core::{BuildResult, TaskStatus};
use tollgate_db::{LedgerRepo, StatusCacheKey, StatusCacheRepo};
use tollgate_scheduler::public_build_status;
use tracing::{debug, info, warn};

use crate::github::{CodeReview, CommitState, CommitStatus};
use crate::provider::CiProvider;
use crate::CiResult;

const TREND_PROVIDER: &str = "github";
const BUILDER_PROVIDER: &str = "buildbucket";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepublishReport {
    pub pushed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// A status to push to every open pull request of a repository.
struct Publication<'a> {
    repository: &'a str,
    provider: &'a str,
    builder: &'a str,
    /// Stored in the cache to suppress identical pushes.
    value: &'a str,
    status: CommitStatus,
}

fn broken_description(name: &str) -> String {
    format!("{name} is currently broken. Be careful when merging this PR.")
}

fn commit_status(green: bool, context: &str, name: &str, target_url: Option<&String>) -> CommitStatus {
    if green {
        CommitStatus {
            state: CommitState::Success,
            target_url: None,
            description: None,
            context: context.to_string(),
        }
    } else {
        CommitStatus {
            state: CommitState::Pending,
            target_url: target_url.cloned(),
            description: Some(broken_description(name)),
            context: context.to_string(),
        }
    }
}

/// Push the repository-wide build trend to every open pull request.
///
/// Only WillFail, Failed and Succeeded are pushed. A pull request whose head
/// already carries the current value is skipped.
pub async fn republish_trend(
    ledger: &dyn LedgerRepo,
    cache: &dyn StatusCacheRepo,
    review: &dyn CodeReview,
    config: &SystemConfig,
    now: DateTime<Utc>,
) -> CiResult<RepublishReport> {
    let trend = public_build_status(ledger, config.scheduler.trend_window, now).await?;
    if !trend.is_reportable() {
        debug!(trend = %trend, "Build trend not reportable");
        return Ok(RepublishReport::default());
    }

    let github = &config.github;
    let publication = Publication {
        repository: &config.repository,
        provider: TREND_PROVIDER,
        builder: tollgate_db::GLOBAL_BUILDER,
        value: trend.as_str(),
        status: commit_status(
            trend == BuildResult::Succeeded,
            &github.status_context,
            &github.build_name,
            github.dashboard_url.as_ref(),
        ),
    };
    publish(&publication, cache, review).await
}

/// Push the newest result of one builder to the pull requests of its
/// repository. Nothing is pushed while the newest build is unfinished.
pub async fn republish_builder(
    provider: &dyn CiProvider,
    builder: &BuilderConfig,
    cache: &dyn StatusCacheRepo,
    review: &dyn CodeReview,
    config: &SystemConfig,
) -> CiResult<RepublishReport> {
    let results = provider.fetch(&[]).await?;
    let latest = results
        .first()
        .and_then(|r| provider.map_status(&r.status));

    let green = match latest {
        Some(TaskStatus::Succeeded) => true,
        Some(TaskStatus::Failed) => false,
        other => {
            debug!(builder = %builder.builder, status = ?other, "Latest build not final");
            return Ok(RepublishReport::default());
        }
    };
    let value = if green {
        TaskStatus::Succeeded.as_str()
    } else {
        TaskStatus::Failed.as_str()
    };

    let publication = Publication {
        repository: builder.repository.as_deref().unwrap_or(&config.repository),
        provider: BUILDER_PROVIDER,
        builder: &builder.builder,
        value,
        status: commit_status(
            green,
            &builder.builder,
            &builder.builder,
            config.github.dashboard_url.as_ref(),
        ),
    };
    publish(&publication, cache, review).await
}

async fn publish(
    publication: &Publication<'_>,
    cache: &dyn StatusCacheRepo,
    review: &dyn CodeReview,
) -> CiResult<RepublishReport> {
    let heads = review.open_pull_request_heads(publication.repository).await?;
    let mut report = RepublishReport::default();

    for sha in heads {
        let key = StatusCacheKey::new(publication.provider, publication.builder, sha.as_str());
        match cache.get_status(&key).await {
            Ok(cached) if cached.as_deref() == Some(publication.value) => {
                report.skipped += 1;
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(commit = %sha, error = %e, "Failed to read status cache");
                report.failed += 1;
                continue;
            }
        }

        match review
            .post_status(publication.repository, &sha, &publication.status)
            .await
        {
            Ok(()) => match cache.set_status(&key, publication.value).await {
                Ok(()) => report.pushed += 1,
                Err(e) => {
                    warn!(commit = %sha, error = %e, "Pushed status but failed to cache it");
                    report.failed += 1;
                }
            },
            Err(e) => {
                warn!(
                    repository = publication.repository,
                    commit = %sha,
                    error = %e,
                    "Failed to push commit status"
                );
                report.failed += 1;
            }
        }
    }

    info!(
        repository = publication.repository,
        builder = publication.builder,
        status = publication.value,
        pushed = report.pushed,
        skipped = report.skipped,
        failed = report.failed,
        "Republished build status"
    );
    Ok(report)
}
