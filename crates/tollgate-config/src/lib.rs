//! KDL configuration parsing for Tollgate.
//!
//! This crate handles parsing of:
//! - System configuration (tracked repository, windows, providers, job intervals)
//! - Task templates, both in the system configuration and in per-commit manifests

pub mod error;
mod nodes;
pub mod system;
pub mod tasks;

pub use error::{ConfigError, ConfigResult};
pub use system::{
    AppVeyorConfig, BuildbucketConfig, BuilderConfig, CommitStatusConfig, GitHubConfig,
    HttpConfig, JobsConfig, SchedulerConfig, SystemConfig, TravisConfig, VacuumConfig,
    default_tasks, load_system_config, parse_system_config,
};
pub use tasks::parse_task_manifest;
