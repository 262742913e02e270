//! The contract every external CI provider implements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tollgate_core::TaskStatus;

use crate::CiResult;

/// Translates a provider's raw status strings into task statuses.
pub trait StatusMapper {
    /// `None` for statuses that carry no information.
    fn map_status(&self, raw: &str) -> Option<TaskStatus>;
}

/// One build or status reported by a provider for a commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalResult {
    pub commit: String,
    /// Distinguishes parallel checks on the same commit, e.g. a status context.
    pub context: Option<String>,
    pub status: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ExternalResult {
    pub fn new(commit: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
            context: None,
            status: status.into(),
            updated_at: None,
        }
    }
}

/// An external CI system whose results drive one task per checklist.
#[async_trait]
pub trait CiProvider: StatusMapper + Send + Sync {
    /// Short identifier used in logs, reasons and cache keys.
    fn name(&self) -> &str;

    /// Name of the task this provider reports on.
    fn task_name(&self) -> &str;

    /// Results for `commits`, newest first. Providers that cannot filter by
    /// commit may return results for other commits too.
    async fn fetch(&self, commits: &[String]) -> CiResult<Vec<ExternalResult>>;
}

/// Reduce the results reported for one commit to a single task status.
///
/// Only the newest result per context counts. Any failure wins, then any
/// skip, then anything still running. `None` when nothing mapped.
pub fn fold_results<'a, M: StatusMapper + ?Sized>(
    mapper: &M,
    results: impl IntoIterator<Item = &'a ExternalResult>,
) -> Option<TaskStatus> {
    let mut latest: HashMap<Option<&str>, &ExternalResult> = HashMap::new();
    for result in results {
        let context = result.context.as_deref();
        match latest.get(&context) {
            Some(existing) if !is_newer(result, existing) => {}
            _ => {
                latest.insert(context, result);
            }
        }
    }

    let statuses: Vec<TaskStatus> = latest
        .values()
        .filter_map(|r| mapper.map_status(&r.status))
        .collect();
    if statuses.is_empty() {
        return None;
    }

    let any = |s: TaskStatus| statuses.contains(&s);
    Some(if any(TaskStatus::Failed) {
        TaskStatus::Failed
    } else if any(TaskStatus::Skipped) {
        TaskStatus::Skipped
    } else if any(TaskStatus::InProgress) || any(TaskStatus::New) {
        TaskStatus::InProgress
    } else {
        TaskStatus::Succeeded
    })
}

/// Results arrive newest first, so a later one replaces an earlier one only
/// when its timestamp says it is more recent.
fn is_newer(candidate: &ExternalResult, existing: &ExternalResult) -> bool {
    match (candidate.updated_at, existing.updated_at) {
        (Some(candidate), Some(existing)) => candidate > existing,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    struct Plain;

    impl StatusMapper for Plain {
        fn map_status(&self, raw: &str) -> Option<TaskStatus> {
            raw.parse().ok()
        }
    }

    fn result(context: &str, status: &str, minutes_ago: i64) -> ExternalResult {
        ExternalResult {
            commit: "abc".to_string(),
            context: Some(context.to_string()),
            status: status.to_string(),
            updated_at: Some(Utc::now() - Duration::minutes(minutes_ago)),
        }
    }

    #[test]
    fn test_any_failure_wins() {
        let results = [
            result("linux", "Succeeded", 1),
            result("mac", "Failed", 1),
            result("windows", "In Progress", 1),
        ];
        assert_eq!(fold_results(&Plain, &results), Some(TaskStatus::Failed));
    }

    #[test]
    fn test_only_newest_per_context_counts() {
        let results = [
            result("linux", "Failed", 30),
            result("linux", "Succeeded", 5),
            result("mac", "Succeeded", 5),
        ];
        assert_eq!(fold_results(&Plain, &results), Some(TaskStatus::Succeeded));
    }

    #[test]
    fn test_pending_when_nothing_failed() {
        let results = [result("linux", "Succeeded", 1), result("mac", "In Progress", 1)];
        assert_eq!(fold_results(&Plain, &results), Some(TaskStatus::InProgress));
    }

    #[test]
    fn test_skipped_before_pending() {
        let results = [result("linux", "Skipped", 1), result("mac", "In Progress", 1)];
        assert_eq!(fold_results(&Plain, &results), Some(TaskStatus::Skipped));
    }

    #[test]
    fn test_nothing_mapped() {
        let results = [result("linux", "bogus", 1)];
        assert_eq!(fold_results(&Plain, &results), None);
        assert_eq!(fold_results(&Plain, &Vec::<ExternalResult>::new()), None);
    }

    #[test]
    fn test_first_result_wins_without_timestamps() {
        let results = [
            ExternalResult::new("abc", "Succeeded"),
            ExternalResult::new("abc", "Failed"),
        ];
        assert_eq!(fold_results(&Plain, &results), Some(TaskStatus::Succeeded));
    }
}
