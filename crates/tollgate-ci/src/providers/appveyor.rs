//! AppVeyor build history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tollgate_config::AppVeyorConfig;
use tollgate_core::TaskStatus;

use crate::http::send_text;
use crate::provider::{CiProvider, ExternalResult, StatusMapper};
use crate::CiResult;

const HISTORY_RECORDS: usize = 20;

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    builds: Vec<AppVeyorBuild>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppVeyorBuild {
    status: String,
    commit_id: String,
    updated: Option<DateTime<Utc>>,
}

pub struct AppVeyorProvider {
    client: Client,
    config: AppVeyorConfig,
}

impl AppVeyorProvider {
    pub fn new(client: Client, config: AppVeyorConfig) -> Self {
        Self { client, config }
    }

    fn history_url(&self) -> String {
        format!(
            "{}/api/projects/{}/{}/history?recordsNumber={HISTORY_RECORDS}&branch={}",
            self.config.api_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.account),
            urlencoding::encode(&self.config.project),
            urlencoding::encode(&self.config.branch)
        )
    }
}

/// AppVeyor lists the latest build last; results are returned newest first.
pub(crate) fn parse_history(body: &str) -> CiResult<Vec<ExternalResult>> {
    let response: HistoryResponse = serde_json::from_str(body)?;
    Ok(response
        .builds
        .into_iter()
        .rev()
        .map(|build| ExternalResult {
            commit: build.commit_id,
            context: None,
            status: build.status,
            updated_at: build.updated,
        })
        .collect())
}

impl StatusMapper for AppVeyorProvider {
    fn map_status(&self, raw: &str) -> Option<TaskStatus> {
        Some(match raw {
            "success" => TaskStatus::Succeeded,
            "running" | "queued" => TaskStatus::InProgress,
            _ => TaskStatus::Failed,
        })
    }
}

#[async_trait]
impl CiProvider for AppVeyorProvider {
    fn name(&self) -> &str {
        "appveyor"
    }

    fn task_name(&self) -> &str {
        &self.config.task_name
    }

    async fn fetch(&self, _commits: &[String]) -> CiResult<Vec<ExternalResult>> {
        let url = self.history_url();
        let body = send_text(self.client.get(&url).header("Accept", "application/json"), &url).await?;
        parse_history(&body)
    }
}
