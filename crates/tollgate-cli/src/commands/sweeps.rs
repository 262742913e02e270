//! One-shot runs of the periodic jobs.

use anyhow::Result;
use chrono::Utc;
use tollgate_ci::{
    BuildbucketProvider, GitHubManifestSource, configured_providers, republish_builder,
    republish_trend,
};
use tollgate_core::checklist::SyncOutcome;
use tracing::warn;

use super::Context;

pub async fn refresh_commits(ctx: &Context) -> Result<()> {
    let manifests = GitHubManifestSource::new(
        ctx.github.clone(),
        ctx.config.repository.clone(),
        ctx.config.github.manifest_path.clone(),
    );
    let results =
        tollgate_ci::refresh_commits(&ctx.github, &ctx.ledger, &manifests, &ctx.config, Utc::now())
            .await?;

    for result in &results {
        let outcome = match result.outcome {
            SyncOutcome::Synced => "synced",
            SyncOutcome::Skipped => "skipped",
        };
        println!("{} {}", result.commit, outcome);
    }
    Ok(())
}

/// Run every configured reconciler; one failing provider does not stop the others.
pub async fn reconcile(ctx: &Context) -> Result<()> {
    let providers = configured_providers(&ctx.config, &ctx.http, &ctx.github);
    if providers.is_empty() {
        println!("No external CI providers configured");
        return Ok(());
    }

    for provider in providers {
        match tollgate_ci::reconcile(
            provider.as_ref(),
            &ctx.ledger,
            ctx.config.scheduler.reconcile_window,
            Utc::now(),
        )
        .await
        {
            Ok(report) => println!(
                "{} ({}): examined {}, updated {}, errors {}",
                provider.name(),
                provider.task_name(),
                report.examined,
                report.updated,
                report.errors
            ),
            Err(e) => warn!(provider = provider.name(), error = %e, "Reconcile failed"),
        }
    }
    Ok(())
}

pub async fn vacuum(ctx: &Context) -> Result<()> {
    let report = tollgate_scheduler::vacuum(&ctx.ledger, &ctx.config.vacuum, Utc::now()).await?;
    println!(
        "examined {}, expired {}, timed out {}, requeued {}, errors {}",
        report.examined, report.expired, report.timed_out, report.requeued, report.errors
    );
    Ok(())
}

pub async fn republish(ctx: &Context) -> Result<()> {
    let report = republish_trend(
        &ctx.ledger,
        &ctx.status_cache,
        ctx.github.as_ref(),
        &ctx.config,
        Utc::now(),
    )
    .await?;
    println!(
        "trend: pushed {}, skipped {}, failed {}",
        report.pushed, report.skipped, report.failed
    );

    let Some(buildbucket) = &ctx.config.buildbucket else {
        return Ok(());
    };
    for provider in BuildbucketProvider::for_builders(&ctx.http, buildbucket) {
        if provider.builder().repository.is_none() {
            continue;
        }
        let report = republish_builder(
            &provider,
            provider.builder(),
            &ctx.status_cache,
            ctx.github.as_ref(),
            &ctx.config,
        )
        .await?;
        println!(
            "{}: pushed {}, skipped {}, failed {}",
            provider.builder().builder,
            report.pushed,
            report.skipped,
            report.failed
        );
    }
    Ok(())
}
