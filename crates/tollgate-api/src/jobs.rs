//! Wiring of the periodic background jobs.

use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tollgate_ci::{
    BuildbucketProvider, GitHubClient, GitHubManifestSource, configured_providers, reconcile,
    refresh_commits, republish_builder, republish_trend,
};
use tollgate_scheduler::{spawn_periodic, vacuum};
use tracing::info;

use crate::AppState;

/// Start all periodic jobs. Dropping the handles does not stop them.
pub fn spawn_jobs(state: &AppState, http: Client, github: Arc<GitHubClient>) -> Vec<JoinHandle<()>> {
    let config = state.config.clone();
    let jobs = config.jobs.clone();
    let mut handles = Vec::new();

    let manifests = Arc::new(GitHubManifestSource::new(
        github.clone(),
        config.repository.clone(),
        config.github.manifest_path.clone(),
    ));
    {
        let (ledger, config, github) = (state.ledger.clone(), config.clone(), github.clone());
        handles.push(spawn_periodic("refresh-commits", jobs.refresh_commits, move || {
            let (ledger, config, github, manifests) =
                (ledger.clone(), config.clone(), github.clone(), manifests.clone());
            async move {
                refresh_commits(&github, ledger.as_ref(), manifests.as_ref(), &config, Utc::now())
                    .await
                    .map(|results| results.len())
            }
        }));
    }

    for provider in configured_providers(&config, &http, &github) {
        info!(provider = provider.name(), task = provider.task_name(), "Reconciling external CI");
        let (ledger, window) = (state.ledger.clone(), config.scheduler.reconcile_window);
        handles.push(spawn_periodic("reconcile", jobs.reconcile, move || {
            let (ledger, provider) = (ledger.clone(), provider.clone());
            async move { reconcile(provider.as_ref(), ledger.as_ref(), window, Utc::now()).await }
        }));
    }

    {
        let (ledger, config) = (state.ledger.clone(), config.clone());
        handles.push(spawn_periodic("vacuum", jobs.vacuum, move || {
            let (ledger, config) = (ledger.clone(), config.clone());
            async move { vacuum(ledger.as_ref(), &config.vacuum, Utc::now()).await }
        }));
    }

    if !config.github.push_statuses {
        info!("Status pushes disabled");
        return handles;
    }

    {
        let (ledger, cache, config, github) = (
            state.ledger.clone(),
            state.status_cache.clone(),
            config.clone(),
            github.clone(),
        );
        handles.push(spawn_periodic("republish-trend", jobs.republish, move || {
            let (ledger, cache, config, github) =
                (ledger.clone(), cache.clone(), config.clone(), github.clone());
            async move {
                republish_trend(ledger.as_ref(), cache.as_ref(), github.as_ref(), &config, Utc::now()).await
            }
        }));
    }

    let builders = config
        .buildbucket
        .as_ref()
        .map(|b| BuildbucketProvider::for_builders(&http, b))
        .unwrap_or_default();
    for provider in builders.into_iter().filter(|p| p.builder().repository.is_some()) {
        let provider = Arc::new(provider);
        let (cache, config, github) = (state.status_cache.clone(), config.clone(), github.clone());
        handles.push(spawn_periodic("republish-builder", jobs.republish, move || {
            let (provider, cache, config, github) =
                (provider.clone(), cache.clone(), config.clone(), github.clone());
            async move {
                republish_builder(
                    provider.as_ref(),
                    provider.builder(),
                    cache.as_ref(),
                    github.as_ref(),
                    &config,
                )
                .await
            }
        }));
    }

    handles
}
