//! Travis CI builds.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tollgate_config::TravisConfig;
use tollgate_core::TaskStatus;

use crate::http::send_text;
use crate::provider::{CiProvider, ExternalResult, StatusMapper};
use crate::CiResult;

#[derive(Debug, Deserialize)]
struct TravisBuild {
    commit: String,
    state: String,
}

pub struct TravisProvider {
    client: Client,
    repository: String,
    config: TravisConfig,
}

impl TravisProvider {
    pub fn new(client: Client, repository: impl Into<String>, config: TravisConfig) -> Self {
        Self {
            client,
            repository: repository.into(),
            config,
        }
    }
}

pub(crate) fn parse_builds(body: &str) -> CiResult<Vec<ExternalResult>> {
    let builds: Vec<TravisBuild> = serde_json::from_str(body)?;
    Ok(builds
        .into_iter()
        .map(|b| ExternalResult::new(b.commit, b.state))
        .collect())
}

impl StatusMapper for TravisProvider {
    fn map_status(&self, raw: &str) -> Option<TaskStatus> {
        Some(match raw {
            "finished" | "passed" => TaskStatus::Succeeded,
            "started" | "created" | "queued" => TaskStatus::InProgress,
            _ => TaskStatus::Failed,
        })
    }
}

#[async_trait]
impl CiProvider for TravisProvider {
    fn name(&self) -> &str {
        "travis"
    }

    fn task_name(&self) -> &str {
        &self.config.task_name
    }

    async fn fetch(&self, _commits: &[String]) -> CiResult<Vec<ExternalResult>> {
        let url = format!(
            "{}/repos/{}/builds",
            self.config.api_url.trim_end_matches('/'),
            self.repository
        );
        let body = send_text(self.client.get(&url).header("Accept", "application/json"), &url).await?;
        parse_builds(&body)
    }
}
