//! LUCI Buildbucket builders, one provider per builder.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tollgate_config::{BuildbucketConfig, BuilderConfig};
use tollgate_core::TaskStatus;

use crate::error::CiError;
use crate::http::send_text;
use crate::provider::{CiProvider, ExternalResult, StatusMapper};
use crate::CiResult;

const PAGE_SIZE: u32 = 40;

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    responses: Vec<SearchResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    search_builds: Option<SearchBuilds>,
}

#[derive(Debug, Deserialize)]
struct SearchBuilds {
    #[serde(default)]
    builds: Vec<Build>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Build {
    status: String,
    input: Option<BuildInput>,
    update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInput {
    gitiles_commit: Option<GitilesCommit>,
}

#[derive(Debug, Deserialize)]
struct GitilesCommit {
    id: String,
}

pub struct BuildbucketProvider {
    client: Client,
    api_url: String,
    project: String,
    bucket: String,
    builder: BuilderConfig,
}

impl BuildbucketProvider {
    pub fn new(client: Client, config: &BuildbucketConfig, builder: BuilderConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.clone(),
            project: config.project.clone(),
            bucket: config.bucket.clone(),
            builder,
        }
    }

    /// One provider for each configured builder.
    pub fn for_builders(client: &Client, config: &BuildbucketConfig) -> Vec<Self> {
        config
            .builders
            .iter()
            .map(|b| Self::new(client.clone(), config, b.clone()))
            .collect()
    }

    pub fn builder(&self) -> &BuilderConfig {
        &self.builder
    }

    fn search_request(&self) -> serde_json::Value {
        json!({
            "requests": [{
                "searchBuilds": {
                    "predicate": {
                        "builder": {
                            "project": self.project,
                            "bucket": self.bucket,
                            "builder": self.builder.builder,
                        }
                    },
                    "pageSize": PAGE_SIZE,
                }
            }]
        })
    }
}

/// Drop the anti-XSSI prefix the pRPC endpoint prepends to JSON bodies.
pub(crate) fn strip_xssi(body: &str) -> &str {
    body.find('{').map_or(body, |start| &body[start..])
}

pub(crate) fn parse_builds(body: &str) -> CiResult<Vec<ExternalResult>> {
    let response: BatchResponse = serde_json::from_str(strip_xssi(body))?;
    let search = response
        .responses
        .into_iter()
        .next()
        .ok_or_else(|| CiError::Parse("empty batch response".to_string()))?;
    Ok(search
        .search_builds
        .map(|s| s.builds)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|build| {
            let commit = build.input?.gitiles_commit?.id;
            Some(ExternalResult {
                commit,
                context: None,
                status: build.status,
                updated_at: build.update_time,
            })
        })
        .collect())
}

impl StatusMapper for BuildbucketProvider {
    fn map_status(&self, raw: &str) -> Option<TaskStatus> {
        match raw {
            "STATUS_UNSPECIFIED" | "SCHEDULED" | "STARTED" => Some(TaskStatus::InProgress),
            "CANCELED" => Some(TaskStatus::Skipped),
            "SUCCESS" => Some(TaskStatus::Succeeded),
            "FAILURE" | "INFRA_FAILURE" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

#[async_trait]
impl CiProvider for BuildbucketProvider {
    fn name(&self) -> &str {
        "buildbucket"
    }

    fn task_name(&self) -> &str {
        &self.builder.task_name
    }

    async fn fetch(&self, _commits: &[String]) -> CiResult<Vec<ExternalResult>> {
        let request = self
            .client
            .post(&self.api_url)
            .header("Accept", "application/json")
            .json(&self.search_request());
        let body = send_text(request, &self.api_url).await?;
        parse_builds(&body)
    }
}
