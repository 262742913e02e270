//! CLI command implementations.

pub mod agents;
pub mod status;
pub mod sweeps;

use anyhow::{Context as _, Result};
use reqwest::Client;
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use tollgate_ci::{GitHubClient, RetryPolicy, build_client};
use tollgate_config::{SystemConfig, load_system_config};
use tollgate_db::{
    PgAgentRepo, PgBenchmarkRepo, PgLedgerRepo, PgStatusCacheRepo, create_pool, run_migrations,
};

/// Connections shared by all commands.
pub struct Context {
    pub pool: PgPool,
    pub ledger: PgLedgerRepo,
    pub agents: PgAgentRepo,
    pub benchmarks: PgBenchmarkRepo,
    pub status_cache: PgStatusCacheRepo,
    pub config: SystemConfig,
    pub http: Client,
    pub github: Arc<GitHubClient>,
}

impl Context {
    pub async fn connect(
        database_url: &str,
        config_path: Option<&Path>,
        github_token: Option<String>,
    ) -> Result<Self> {
        let config = match config_path {
            Some(path) => load_system_config(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => SystemConfig::default(),
        };

        let pool = create_pool(database_url)
            .await
            .context("Failed to connect to database")?;

        let http = build_client(&config.http)?;
        let github = Arc::new(GitHubClient::new(
            http.clone(),
            config.github.api_url.clone(),
            config.github.raw_content_url.clone(),
            github_token,
            RetryPolicy::from(&config.http),
        ));

        Ok(Self {
            ledger: PgLedgerRepo::new(pool.clone()),
            agents: PgAgentRepo::new(pool.clone()),
            benchmarks: PgBenchmarkRepo::new(pool.clone()),
            status_cache: PgStatusCacheRepo::new(pool.clone()),
            pool,
            config,
            http,
            github,
        })
    }
}

pub async fn migrate(ctx: &Context) -> Result<()> {
    run_migrations(&ctx.pool).await?;
    println!("Migrations applied");
    Ok(())
}

pub fn validate(path: &Path) -> Result<()> {
    let config = load_system_config(path)
        .with_context(|| format!("Configuration error in {}", path.display()))?;

    println!("Configuration is valid");
    println!("  repository: {}", config.repository);
    println!("  tasks: {}", config.tasks.len());
    for task in &config.tasks {
        println!(
            "    {}/{} requires {}",
            task.stage_name,
            task.name,
            task.required_capabilities.join(", ")
        );
    }
    Ok(())
}
