//! External systems Tollgate talks to.
//!
//! - GitHub: commits, task manifests, commit statuses and pull requests
//! - CI providers whose results are mirrored onto ledger tasks
//! - Republishing of the build trend to open pull requests

pub mod commits;
pub mod error;
pub mod github;
pub mod http;
pub mod manifest;
pub mod provider;
pub mod providers;
pub mod reconcile;
pub mod republish;

pub use commits::refresh_commits;
pub use error::{CiError, CiResult};
pub use github::{CodeReview, CommitState, CommitStatus, GitHubClient};
pub use http::{RetryPolicy, build_client, fetch_with_retry};
pub use manifest::GitHubManifestSource;
pub use provider::{CiProvider, ExternalResult, StatusMapper, fold_results};
pub use providers::{
    AppVeyorProvider, BuildbucketProvider, GitHubStatusProvider, TravisProvider, configured_providers,
};
pub use reconcile::{ReconcileReport, reconcile};
pub use republish::{RepublishReport, republish_builder, republish_trend};
