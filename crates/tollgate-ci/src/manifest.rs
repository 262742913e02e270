//! Task manifests checked into the tracked repository.

use async_trait::async_trait;
use std::sync::Arc;
use tollgate_config::parse_task_manifest;
use tollgate_core::task::TaskTemplate;
use tollgate_scheduler::{ManifestSource, SchedulerError, SchedulerResult};
use tracing::warn;

use crate::github::GitHubClient;

/// Reads the manifest at `path` from raw repository content.
pub struct GitHubManifestSource {
    github: Arc<GitHubClient>,
    repository: String,
    path: String,
}

impl GitHubManifestSource {
    pub fn new(github: Arc<GitHubClient>, repository: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            github,
            repository: repository.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl ManifestSource for GitHubManifestSource {
    async fn tasks_at(&self, sha: &str) -> SchedulerResult<Vec<TaskTemplate>> {
        let content = self
            .github
            .file_at(&self.repository, sha, &self.path)
            .await
            .map_err(|e| SchedulerError::Manifest {
                commit: sha.to_string(),
                message: e.to_string(),
            })?;

        let Some(content) = content else {
            return Ok(Vec::new());
        };

        match parse_task_manifest(&content) {
            Ok(tasks) => Ok(tasks),
            Err(e) => {
                // A broken manifest must not block ingestion; defaults still apply.
                warn!(commit = %sha, path = %self.path, error = %e, "Ignoring malformed task manifest");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RetryPolicy;
    use axum::Router;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::time::Duration;

    async fn source() -> GitHubManifestSource {
        let router = Router::new().route(
            "/{owner}/{repo}/{sha}/{*path}",
            get(|Path((_, _, sha, _)): Path<(String, String, String, String)>| async move {
                match sha.as_str() {
                    "good" => (
                        StatusCode::OK,
                        "task \"devicelab\" \"complex_layout__start_up\" { requires \"has-android-device\" }",
                    ),
                    "broken" => (StatusCode::OK, "task {"),
                    "down" => (StatusCode::SERVICE_UNAVAILABLE, ""),
                    _ => (StatusCode::NOT_FOUND, ""),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let base = format!("http://{addr}");
        let github = GitHubClient::new(
            reqwest::Client::new(),
            base.as_str(),
            base.as_str(),
            None,
            RetryPolicy {
                attempts: 2,
                base_delay: Duration::from_millis(1),
            },
        );
        GitHubManifestSource::new(Arc::new(github), "flutter/flutter", ".ci/tasks.kdl")
    }

    #[tokio::test]
    async fn test_manifest_tasks_are_parsed() {
        let tasks = source().await.tasks_at("good").await.unwrap();
        assert_eq!(
            tasks,
            vec![TaskTemplate::new(
                "devicelab",
                "complex_layout__start_up",
                &["has-android-device"]
            )]
        );
    }

    #[tokio::test]
    async fn test_missing_or_malformed_manifest_yields_no_tasks() {
        let source = source().await;
        assert!(source.tasks_at("none").await.unwrap().is_empty());
        assert!(source.tasks_at("broken").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_manifest_is_an_error() {
        let result = source().await.tasks_at("down").await;
        assert!(matches!(result, Err(SchedulerError::Manifest { commit, .. }) if commit == "down"));
    }
}
