//! System configuration parsing.
//!
//! Every value has a default, so an empty document is a valid configuration:
//!
//! ```kdl
//! repository "flutter/flutter"
//!
//! scheduler {
//!     checklist-window 20
//!     reconcile-window 20
//! }
//!
//! cirrus {
//!     contexts "tests-linux" "analyze"
//! }
//!
//! buildbucket {
//!     builder "Linux" task="linux_bot" repository="flutter/engine"
//! }
//!
//! task "devicelab" "flutter_gallery__start_up" {
//!     requires "has-android-device"
//! }
//! ```

use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tollgate_core::task::TaskTemplate;

use crate::nodes::{child_bool, child_string, child_u64, first_string_arg, string_args, string_prop};
use crate::tasks::{ensure_unique, parse_task};
use crate::{ConfigError, ConfigResult};

/// System-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Tracked repository in "owner/name" form.
    pub repository: String,
    pub scheduler: SchedulerConfig,
    pub vacuum: VacuumConfig,
    pub github: GitHubConfig,
    pub http: HttpConfig,
    pub jobs: JobsConfig,
    pub cirrus: Option<CommitStatusConfig>,
    pub appveyor: Option<AppVeyorConfig>,
    pub travis: Option<TravisConfig>,
    pub buildbucket: Option<BuildbucketConfig>,
    /// Tasks created for every ingested commit.
    pub tasks: Vec<TaskTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of most recent checklists scanned for reservable work.
    pub checklist_window: usize,
    /// Number of most recent checklists whose external tasks are reconciled.
    pub reconcile_window: usize,
    /// Number of most recent checklists the build trend is computed from.
    pub trend_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VacuumConfig {
    pub checklist_window: usize,
    pub new_task_max_age_hours: i64,
    pub in_progress_timeout_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub api_url: String,
    /// `context` of the commit status pushed to pull requests.
    pub status_context: String,
    /// Human-readable name used in status descriptions.
    pub build_name: String,
    pub dashboard_url: Option<String>,
    /// Maximum commits ingested in one transaction.
    pub commit_batch_size: usize,
    /// Path of the per-commit task manifest inside the repository.
    pub manifest_path: String,
    pub raw_content_url: String,
    /// Whether to push statuses at all (disabled for local development).
    pub push_statuses: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    pub refresh_commits: Duration,
    pub reconcile: Duration,
    pub vacuum: Duration,
    pub republish: Duration,
}

/// GitHub commit statuses posted by a third-party CI (e.g. Cirrus).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitStatusConfig {
    pub task_name: String,
    /// Status contexts that count towards the task.
    pub contexts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppVeyorConfig {
    pub api_url: String,
    pub account: String,
    pub project: String,
    pub branch: String,
    pub task_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravisConfig {
    pub api_url: String,
    pub task_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildbucketConfig {
    pub api_url: String,
    pub project: String,
    pub bucket: String,
    pub builders: Vec<BuilderConfig>,
}

/// One LUCI builder and the task it drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    pub builder: String,
    pub task_name: String,
    /// Repository whose pull requests receive this builder's status.
    pub repository: Option<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            repository: "flutter/flutter".to_string(),
            scheduler: SchedulerConfig {
                checklist_window: 20,
                reconcile_window: 20,
                trend_window: 20,
            },
            vacuum: VacuumConfig {
                checklist_window: 20,
                new_task_max_age_hours: 96,
                in_progress_timeout_minutes: 60,
            },
            github: GitHubConfig {
                api_url: "https://api.github.com".to_string(),
                status_context: "flutter-build".to_string(),
                build_name: "Flutter build".to_string(),
                dashboard_url: None,
                commit_batch_size: 30,
                manifest_path: ".ci/tasks.kdl".to_string(),
                raw_content_url: "https://raw.githubusercontent.com".to_string(),
                push_statuses: true,
            },
            http: HttpConfig {
                timeout: Duration::from_secs(30),
                retry_attempts: 3,
                retry_base_delay: Duration::from_millis(250),
            },
            jobs: JobsConfig {
                refresh_commits: Duration::from_secs(120),
                reconcile: Duration::from_secs(60),
                vacuum: Duration::from_secs(600),
                republish: Duration::from_secs(120),
            },
            cirrus: None,
            appveyor: None,
            travis: None,
            buildbucket: None,
            tasks: default_tasks(),
        }
    }
}

/// Read and parse a configuration file.
pub fn load_system_config(path: impl AsRef<Path>) -> ConfigResult<SystemConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_system_config(&content)
}

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SystemConfig {
        tasks: Vec::new(),
        ..SystemConfig::default()
    };

    for node in doc.nodes() {
        match node.name().value() {
            "repository" => {
                config.repository = first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("repository path".to_string()))?;
            }
            "scheduler" => parse_scheduler(node, &mut config.scheduler)?,
            "vacuum" => parse_vacuum(node, &mut config.vacuum)?,
            "github" => parse_github(node, &mut config.github)?,
            "http" => parse_http(node, &mut config.http)?,
            "jobs" => parse_jobs(node, &mut config.jobs)?,
            "cirrus" => config.cirrus = Some(parse_cirrus(node)),
            "appveyor" => config.appveyor = Some(parse_appveyor(node)),
            "travis" => config.travis = Some(parse_travis(node)),
            "buildbucket" => config.buildbucket = Some(parse_buildbucket(node)?),
            "task" => config.tasks.push(parse_task(node)?),
            _ => {} // Ignore unknown nodes
        }
    }

    if !config.repository.contains('/') {
        return Err(ConfigError::InvalidValue {
            field: "repository".to_string(),
            message: format!("expected owner/name, got '{}'", config.repository),
        });
    }
    if config.tasks.is_empty() {
        config.tasks = default_tasks();
    }
    ensure_unique(&config.tasks)?;

    Ok(config)
}

/// Tasks used when the configuration declares no `task` nodes.
pub fn default_tasks() -> Vec<TaskTemplate> {
    let android = ["has-android-device"];
    let ios = ["has-ios-device"];
    vec![
        TaskTemplate::new("cirrus", "cirrus", &["can-update-github"]),
        TaskTemplate::new("travis", "travis", &["can-update-travis"]),
        TaskTemplate::new("appveyor", "appveyor", &["can-update-appveyor"]),
        TaskTemplate::new("chromebot", "mac_bot", &["can-update-chromebots"]),
        TaskTemplate::new("chromebot", "linux_bot", &["can-update-chromebots"]),
        TaskTemplate::new("chromebot", "windows_bot", &["can-update-chromebots"]),
        TaskTemplate::new("devicelab", "complex_layout_scroll_perf__timeline_summary", &android),
        TaskTemplate::new("devicelab", "flutter_gallery__start_up", &android),
        TaskTemplate::new("devicelab", "complex_layout__start_up", &android),
        TaskTemplate::new("devicelab", "flutter_gallery__transition_perf", &android),
        TaskTemplate::new("devicelab", "flutter_gallery__build", &android),
        TaskTemplate::new("devicelab", "hot_mode_dev_cycle__benchmark", &android),
        TaskTemplate::new("devicelab_ios", "flutter_gallery_ios__start_up", &ios),
        TaskTemplate::new("devicelab_ios", "complex_layout_ios__start_up", &ios),
    ]
}

fn window(node: &KdlNode, name: &str) -> ConfigResult<Option<usize>> {
    match child_u64(node, name)? {
        Some(0) => Err(ConfigError::InvalidValue {
            field: name.to_string(),
            message: "must be at least 1".to_string(),
        }),
        Some(v) => usize::try_from(v).map(Some).map_err(|_| ConfigError::InvalidValue {
            field: name.to_string(),
            message: format!("{v} is out of range"),
        }),
        None => Ok(None),
    }
}

fn hours_or_minutes(node: &KdlNode, name: &str) -> ConfigResult<Option<i64>> {
    child_u64(node, name)?
        .map(|v| {
            i64::try_from(v).map_err(|_| ConfigError::InvalidValue {
                field: name.to_string(),
                message: format!("{v} is out of range"),
            })
        })
        .transpose()
}

fn parse_scheduler(node: &KdlNode, scheduler: &mut SchedulerConfig) -> ConfigResult<()> {
    if let Some(v) = window(node, "checklist-window")? {
        scheduler.checklist_window = v;
    }
    if let Some(v) = window(node, "reconcile-window")? {
        scheduler.reconcile_window = v;
    }
    if let Some(v) = window(node, "trend-window")? {
        scheduler.trend_window = v;
    }
    Ok(())
}

fn parse_vacuum(node: &KdlNode, vacuum: &mut VacuumConfig) -> ConfigResult<()> {
    if let Some(v) = window(node, "checklist-window")? {
        vacuum.checklist_window = v;
    }
    if let Some(v) = hours_or_minutes(node, "new-task-max-age-hours")? {
        vacuum.new_task_max_age_hours = v;
    }
    if let Some(v) = hours_or_minutes(node, "in-progress-timeout-minutes")? {
        vacuum.in_progress_timeout_minutes = v;
    }
    Ok(())
}

fn parse_github(node: &KdlNode, github: &mut GitHubConfig) -> ConfigResult<()> {
    if let Some(v) = child_string(node, "api-url") {
        github.api_url = v;
    }
    if let Some(v) = child_string(node, "status-context") {
        github.status_context = v;
    }
    if let Some(v) = child_string(node, "build-name") {
        github.build_name = v;
    }
    if let Some(v) = child_string(node, "dashboard-url") {
        github.dashboard_url = Some(v);
    }
    if let Some(v) = window(node, "commit-batch-size")? {
        github.commit_batch_size = v;
    }
    if let Some(v) = child_string(node, "manifest-path") {
        github.manifest_path = v;
    }
    if let Some(v) = child_string(node, "raw-content-url") {
        github.raw_content_url = v;
    }
    if let Some(v) = child_bool(node, "push-statuses") {
        github.push_statuses = v;
    }
    Ok(())
}

fn parse_http(node: &KdlNode, http: &mut HttpConfig) -> ConfigResult<()> {
    if let Some(v) = child_u64(node, "timeout-seconds")? {
        http.timeout = Duration::from_secs(v);
    }
    if let Some(v) = child_u64(node, "retry-attempts")? {
        http.retry_attempts = u32::try_from(v).map_err(|_| ConfigError::InvalidValue {
            field: "retry-attempts".to_string(),
            message: format!("{v} is out of range"),
        })?;
    }
    if let Some(v) = child_u64(node, "retry-base-delay-ms")? {
        http.retry_base_delay = Duration::from_millis(v);
    }
    Ok(())
}

fn parse_jobs(node: &KdlNode, jobs: &mut JobsConfig) -> ConfigResult<()> {
    let interval = |name: &str| -> ConfigResult<Option<Duration>> {
        Ok(child_u64(node, name)?.map(Duration::from_secs))
    };
    if let Some(v) = interval("refresh-commits")? {
        jobs.refresh_commits = v;
    }
    if let Some(v) = interval("reconcile")? {
        jobs.reconcile = v;
    }
    if let Some(v) = interval("vacuum")? {
        jobs.vacuum = v;
    }
    if let Some(v) = interval("republish")? {
        jobs.republish = v;
    }
    Ok(())
}

fn parse_cirrus(node: &KdlNode) -> CommitStatusConfig {
    CommitStatusConfig {
        task_name: child_string(node, "task").unwrap_or_else(|| "cirrus".to_string()),
        contexts: crate::nodes::child(node, "contexts")
            .map(string_args)
            .unwrap_or_default(),
    }
}

fn parse_appveyor(node: &KdlNode) -> AppVeyorConfig {
    AppVeyorConfig {
        api_url: child_string(node, "api-url")
            .unwrap_or_else(|| "https://ci.appveyor.com".to_string()),
        account: child_string(node, "account").unwrap_or_else(|| "flutter".to_string()),
        project: child_string(node, "project").unwrap_or_else(|| "flutter".to_string()),
        branch: child_string(node, "branch").unwrap_or_else(|| "master".to_string()),
        task_name: child_string(node, "task").unwrap_or_else(|| "appveyor".to_string()),
    }
}

fn parse_travis(node: &KdlNode) -> TravisConfig {
    TravisConfig {
        api_url: child_string(node, "api-url")
            .unwrap_or_else(|| "https://api.travis-ci.org".to_string()),
        task_name: child_string(node, "task").unwrap_or_else(|| "travis".to_string()),
    }
}

fn parse_buildbucket(node: &KdlNode) -> ConfigResult<BuildbucketConfig> {
    let mut builders = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes().iter().filter(|c| c.name().value() == "builder") {
            let builder = first_string_arg(child)
                .ok_or_else(|| ConfigError::MissingField("builder name".to_string()))?;
            let task_name = string_prop(child, "task").ok_or_else(|| {
                ConfigError::MissingField(format!("task for builder '{builder}'"))
            })?;
            builders.push(BuilderConfig {
                builder,
                task_name,
                repository: string_prop(child, "repository"),
            });
        }
    }

    Ok(BuildbucketConfig {
        api_url: child_string(node, "api-url").unwrap_or_else(|| {
            "https://cr-buildbucket.appspot.com/prpc/buildbucket.v2.Builds/Batch".to_string()
        }),
        project: child_string(node, "project").unwrap_or_else(|| "flutter".to_string()),
        bucket: child_string(node, "bucket").unwrap_or_else(|| "prod".to_string()),
        builders,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = parse_system_config("").unwrap();
        assert_eq!(config.repository, "flutter/flutter");
        assert_eq!(config.scheduler.checklist_window, 20);
        assert_eq!(config.vacuum.new_task_max_age_hours, 96);
        assert_eq!(config.vacuum.in_progress_timeout_minutes, 60);
        assert_eq!(config.github.commit_batch_size, 30);
        assert!(config.cirrus.is_none());
        assert_eq!(config.tasks, default_tasks());
    }

    #[test]
    fn test_parse_full_config() {
        let kdl = r#"
            repository "flutter/flutter"

            scheduler {
                checklist-window 10
                reconcile-window 5
            }

            vacuum {
                in-progress-timeout-minutes 90
            }

            github {
                status-context "tollgate"
                push-statuses #false
            }

            jobs {
                vacuum 300
            }

            cirrus {
                contexts "tests-linux" "analyze"
            }

            appveyor {
                account "flutter"
            }

            buildbucket {
                builder "Linux" task="linux_bot"
                builder "Linux Engine" task="linux_engine" repository="flutter/engine"
            }

            task "devicelab" "flutter_gallery__start_up" {
                requires "has-android-device"
            }
        "#;

        let config = parse_system_config(kdl).unwrap();
        assert_eq!(config.scheduler.checklist_window, 10);
        assert_eq!(config.scheduler.reconcile_window, 5);
        assert_eq!(config.scheduler.trend_window, 20);
        assert_eq!(config.vacuum.in_progress_timeout_minutes, 90);
        assert_eq!(config.github.status_context, "tollgate");
        assert!(!config.github.push_statuses);
        assert_eq!(config.jobs.vacuum, Duration::from_secs(300));

        let cirrus = config.cirrus.unwrap();
        assert_eq!(cirrus.task_name, "cirrus");
        assert_eq!(cirrus.contexts, vec!["tests-linux", "analyze"]);

        assert_eq!(config.appveyor.unwrap().task_name, "appveyor");

        let buildbucket = config.buildbucket.unwrap();
        assert_eq!(buildbucket.builders.len(), 2);
        assert_eq!(buildbucket.builders[1].task_name, "linux_engine");
        assert_eq!(
            buildbucket.builders[1].repository.as_deref(),
            Some("flutter/engine")
        );

        assert_eq!(config.tasks.len(), 1);
    }

    #[test]
    fn test_zero_window_rejected() {
        let kdl = "scheduler {\n checklist-window 0\n}";
        assert!(matches!(
            parse_system_config(kdl).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_builder_without_task_rejected() {
        let kdl = r#"buildbucket { builder "Linux" }"#;
        assert!(matches!(
            parse_system_config(kdl).unwrap_err(),
            ConfigError::MissingField(_)
        ));
    }

    #[test]
    fn test_repository_must_have_owner() {
        assert!(parse_system_config(r#"repository "flutter""#).is_err());
    }
}
