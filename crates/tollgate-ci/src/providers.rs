//! Concrete external CI providers.

pub mod appveyor;
pub mod buildbucket;
pub mod github_status;
pub mod travis;

pub use appveyor::AppVeyorProvider;
pub use buildbucket::BuildbucketProvider;
pub use github_status::GitHubStatusProvider;
pub use travis::TravisProvider;

use reqwest::Client;
use std::sync::Arc;
use tollgate_config::SystemConfig;

use crate::github::GitHubClient;
use crate::provider::CiProvider;

/// Every external CI provider enabled in `config`.
pub fn configured_providers(
    config: &SystemConfig,
    http: &Client,
    github: &Arc<GitHubClient>,
) -> Vec<Arc<dyn CiProvider>> {
    let mut providers: Vec<Arc<dyn CiProvider>> = Vec::new();
    if let Some(cirrus) = &config.cirrus {
        providers.push(Arc::new(GitHubStatusProvider::new(
            github.clone(),
            config.repository.clone(),
            cirrus,
        )));
    }
    if let Some(appveyor) = &config.appveyor {
        providers.push(Arc::new(AppVeyorProvider::new(http.clone(), appveyor.clone())));
    }
    if let Some(travis) = &config.travis {
        providers.push(Arc::new(TravisProvider::new(
            http.clone(),
            config.repository.clone(),
            travis.clone(),
        )));
    }
    if let Some(buildbucket) = &config.buildbucket {
        for provider in BuildbucketProvider::for_builders(http, buildbucket) {
            providers.push(Arc::new(provider));
        }
    }
    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RetryPolicy;
    use tollgate_config::parse_system_config;

    #[test]
    fn test_providers_follow_configuration() {
        let config = parse_system_config(
            r#"
            cirrus { contexts "tests-linux"; }
            travis
            buildbucket {
                builder "Linux" task="linux_bot"
                builder "Mac" task="mac_bot"
            }
            "#,
        )
        .unwrap();
        let http = Client::new();
        let github = Arc::new(GitHubClient::new(
            http.clone(),
            "http://localhost",
            "http://localhost",
            None,
            RetryPolicy::default(),
        ));

        let names: Vec<(String, String)> = configured_providers(&config, &http, &github)
            .iter()
            .map(|p| (p.name().to_string(), p.task_name().to_string()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("github-status".to_string(), "cirrus".to_string()),
                ("travis".to_string(), "travis".to_string()),
                ("buildbucket".to_string(), "linux_bot".to_string()),
                ("buildbucket".to_string(), "mac_bot".to_string()),
            ]
        );
    }

    #[test]
    fn test_no_providers_by_default() {
        let github = Arc::new(GitHubClient::new(
            Client::new(),
            "http://localhost",
            "http://localhost",
            None,
            RetryPolicy::default(),
        ));
        assert!(configured_providers(&SystemConfig::default(), &Client::new(), &github).is_empty());
    }
}
