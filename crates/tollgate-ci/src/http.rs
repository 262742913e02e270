//! Shared HTTP plumbing: client construction, status checks and retries.

use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;
use tollgate_config::HttpConfig;
use tracing::warn;

use crate::{CiError, CiResult};

pub(crate) const USER_AGENT: &str = "Tollgate";

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            base_delay: config.retry_base_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// Build a client whose every request is bounded by the configured timeout.
pub fn build_client(config: &HttpConfig) -> CiResult<Client> {
    Ok(Client::builder()
        .timeout(config.timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Send a request and return its body, failing on non-success statuses.
pub(crate) async fn send_text(request: RequestBuilder, url: &str) -> CiResult<String> {
    let response = request.send().await?;
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(CiError::NotFound(url.to_string()));
    }
    if !status.is_success() {
        return Err(CiError::Api {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response.text().await?)
}

/// GET `url`, retrying transient failures.
///
/// A 404 is permanent and yields `Ok(None)` without retrying.
pub async fn fetch_with_retry(
    client: &Client,
    url: &str,
    headers: &[(&str, String)],
    policy: RetryPolicy,
) -> CiResult<Option<String>> {
    let mut delay = policy.base_delay;
    let mut attempt = 1;

    loop {
        let mut request = client.get(url);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        match send_text(request, url).await {
            Ok(body) => return Ok(Some(body)),
            Err(CiError::NotFound(_)) => return Ok(None),
            Err(e) if attempt >= policy.attempts => return Err(e),
            Err(e) => {
                warn!(url, attempt, error = %e, "Request failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
        }
    }
}
