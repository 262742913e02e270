//! Commit statuses posted to GitHub by a third-party CI.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tollgate_config::CommitStatusConfig;
use tollgate_core::TaskStatus;

use crate::github::GitHubClient;
use crate::provider::{CiProvider, ExternalResult, StatusMapper};
use crate::CiResult;

pub struct GitHubStatusProvider {
    github: Arc<GitHubClient>,
    repository: String,
    task_name: String,
    contexts: HashSet<String>,
}

impl GitHubStatusProvider {
    pub fn new(github: Arc<GitHubClient>, repository: impl Into<String>, config: &CommitStatusConfig) -> Self {
        Self {
            github,
            repository: repository.into(),
            task_name: config.task_name.clone(),
            contexts: config.contexts.iter().cloned().collect(),
        }
    }
}

impl StatusMapper for GitHubStatusProvider {
    fn map_status(&self, raw: &str) -> Option<TaskStatus> {
        Some(match raw {
            "success" => TaskStatus::Succeeded,
            "pending" => TaskStatus::InProgress,
            _ => TaskStatus::Failed,
        })
    }
}

#[async_trait]
impl CiProvider for GitHubStatusProvider {
    fn name(&self) -> &str {
        "github-status"
    }

    fn task_name(&self) -> &str {
        &self.task_name
    }

    async fn fetch(&self, commits: &[String]) -> CiResult<Vec<ExternalResult>> {
        let mut results = Vec::new();
        for sha in commits {
            let statuses = self.github.statuses(&self.repository, sha).await?;
            results.extend(
                statuses
                    .into_iter()
                    .filter(|s| self.contexts.contains(&s.context))
                    .map(|s| ExternalResult {
                        commit: sha.clone(),
                        context: Some(s.context),
                        status: s.state,
                        updated_at: s.updated_at,
                    }),
            );
        }
        Ok(results)
    }
}
