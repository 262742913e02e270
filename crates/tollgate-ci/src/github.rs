//! GitHub REST client for commits, statuses, pull requests and file contents.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tollgate_core::CommitInfo;
use tollgate_core::checklist::AuthorInfo;

use crate::http::{RetryPolicy, fetch_with_retry, send_text};
use crate::{CiError, CiResult};

const PAGE_SIZE: usize = 100;

/// A commit as listed by `GET /repos/{repo}/commits`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCommit {
    pub sha: String,
    pub author: Option<GitHubUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
}

impl From<GitHubCommit> for CommitInfo {
    fn from(commit: GitHubCommit) -> Self {
        CommitInfo {
            sha: commit.sha,
            author: commit
                .author
                .map(|a| AuthorInfo {
                    login: a.login,
                    avatar_url: a.avatar_url,
                })
                .unwrap_or_default(),
        }
    }
}

/// One entry of `GET /repos/{repo}/statuses/{sha}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubStatus {
    pub state: String,
    pub context: String,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub head: PullRequestHead,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestHead {
    pub sha: String,
}

/// State of a commit status shown on a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Success,
    Pending,
    Failure,
}

/// Body of `POST /repos/{repo}/statuses/{sha}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitStatus {
    pub state: CommitState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub context: String,
}

/// The code-review system statuses are published to.
#[async_trait]
pub trait CodeReview: Send + Sync {
    /// Head commits of all open pull requests of `repository`.
    async fn open_pull_request_heads(&self, repository: &str) -> CiResult<Vec<String>>;

    async fn post_status(&self, repository: &str, sha: &str, status: &CommitStatus) -> CiResult<()>;
}

/// GitHub API client.
pub struct GitHubClient {
    client: Client,
    api_url: String,
    raw_content_url: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl GitHubClient {
    pub fn new(
        client: Client,
        api_url: impl Into<String>,
        raw_content_url: impl Into<String>,
        token: Option<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            raw_content_url: raw_content_url.into().trim_end_matches('/').to_string(),
            token,
            retry,
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> CiResult<T> {
        let body = send_text(self.authorized(self.client.get(url)), url).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Most recent commits of the default branch, newest first.
    pub async fn commits(&self, repository: &str, limit: usize) -> CiResult<Vec<CommitInfo>> {
        let url = format!(
            "{}/repos/{repository}/commits?per_page={}",
            self.api_url,
            limit.clamp(1, PAGE_SIZE)
        );
        let commits: Vec<GitHubCommit> = self.get_json(&url).await?;
        Ok(commits.into_iter().map(CommitInfo::from).collect())
    }

    /// Statuses reported for a commit, newest first.
    pub async fn statuses(&self, repository: &str, sha: &str) -> CiResult<Vec<GitHubStatus>> {
        let url = format!(
            "{}/repos/{repository}/statuses/{}",
            self.api_url,
            urlencoding::encode(sha)
        );
        self.get_json(&url).await
    }

    /// All open pull requests, following pagination until a short page.
    pub async fn open_pull_requests(&self, repository: &str) -> CiResult<Vec<PullRequest>> {
        let mut pull_requests = Vec::new();
        for page in 1.. {
            let url = format!(
                "{}/repos/{repository}/pulls?state=open&per_page={PAGE_SIZE}&page={page}&sort=created",
                self.api_url
            );
            let batch: Vec<PullRequest> = self.get_json(&url).await?;
            let last_page = batch.len() < PAGE_SIZE;
            pull_requests.extend(batch);
            if last_page {
                break;
            }
        }
        Ok(pull_requests)
    }

    pub async fn create_status(
        &self,
        repository: &str,
        sha: &str,
        status: &CommitStatus,
    ) -> CiResult<()> {
        let url = format!(
            "{}/repos/{repository}/statuses/{}",
            self.api_url,
            urlencoding::encode(sha)
        );
        let response = self
            .authorized(self.client.post(&url))
            .json(status)
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(CiError::Api {
                url,
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    /// Content of `path` at commit `sha`, or `None` if the file does not exist.
    pub async fn file_at(&self, repository: &str, sha: &str, path: &str) -> CiResult<Option<String>> {
        let url = format!(
            "{}/{repository}/{}/{}",
            self.raw_content_url,
            urlencoding::encode(sha),
            path.trim_start_matches('/')
        );
        let headers: Vec<(&str, String)> = self
            .token
            .iter()
            .map(|token| ("Authorization", format!("Bearer {token}")))
            .collect();
        fetch_with_retry(&self.client, &url, &headers, self.retry).await
    }
}

#[async_trait]
impl CodeReview for GitHubClient {
    async fn open_pull_request_heads(&self, repository: &str) -> CiResult<Vec<String>> {
        Ok(self
            .open_pull_requests(repository)
            .await?
            .into_iter()
            .map(|pr| pr.head.sha)
            .collect())
    }

    async fn post_status(&self, repository: &str, sha: &str, status: &CommitStatus) -> CiResult<()> {
        self.create_status(repository, sha, status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post};
    use axum::Json;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::time::Duration;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base: &str) -> GitHubClient {
        GitHubClient::new(
            Client::new(),
            base,
            base,
            Some("secret".to_string()),
            RetryPolicy {
                attempts: 1,
                base_delay: Duration::from_millis(1),
            },
        )
    }

    #[test]
    fn test_commit_status_serialization() {
        let status = CommitStatus {
            state: CommitState::Pending,
            target_url: None,
            description: Some("broken".to_string()),
            context: "flutter-build".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({ "state": "pending", "description": "broken", "context": "flutter-build" })
        );
    }

    #[tokio::test]
    async fn test_pull_requests_follow_pagination() {
        let router = Router::new().route(
            "/repos/{owner}/{repo}/pulls",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                let page: usize = query["page"].parse().unwrap();
                let count = if page == 1 { 100 } else { 7 };
                let prs: Vec<Value> = (0..count)
                    .map(|i| json!({ "number": page * 1000 + i, "head": { "sha": format!("sha-{page}-{i}") } }))
                    .collect();
                Json(prs)
            }),
        );
        let base = serve(router).await;

        let heads = client(&base)
            .open_pull_request_heads("flutter/flutter")
            .await
            .unwrap();
        assert_eq!(heads.len(), 107);
        assert_eq!(heads[100], "sha-2-0");
    }

    #[tokio::test]
    async fn test_create_status_requires_created() {
        let router = Router::new()
            .route(
                "/repos/{owner}/{repo}/statuses/{sha}",
                post(|Path((_, _, sha)): Path<(String, String, String)>| async move {
                    if sha == "good" {
                        AxumStatus::CREATED
                    } else {
                        AxumStatus::OK
                    }
                }),
            );
        let base = serve(router).await;
        let status = CommitStatus {
            state: CommitState::Success,
            target_url: None,
            description: None,
            context: "flutter-build".to_string(),
        };

        let github = client(&base);
        assert!(github.create_status("flutter/flutter", "good", &status).await.is_ok());
        assert!(matches!(
            github.create_status("flutter/flutter", "bad", &status).await,
            Err(CiError::Api { status: 200, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let router = Router::new().route(
            "/{owner}/{repo}/{sha}/{*path}",
            get(|Path((_, _, sha, _)): Path<(String, String, String, String)>| async move {
                if sha == "with-manifest" {
                    (AxumStatus::OK, "task \"devicelab\" \"a\" { requires \"android\" }")
                } else {
                    (AxumStatus::NOT_FOUND, "")
                }
            }),
        );
        let base = serve(router).await;
        let github = client(&base);

        let found = github
            .file_at("flutter/flutter", "with-manifest", ".ci/tasks.kdl")
            .await
            .unwrap();
        assert!(found.unwrap().contains("devicelab"));

        let missing = github
            .file_at("flutter/flutter", "without", ".ci/tasks.kdl")
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
