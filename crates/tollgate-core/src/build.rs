//! Per-checklist build results and the aggregate build trend.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::checklist::Checklist;
use crate::stage::{PRIMARY_STAGE, Stage};
use crate::task::TaskStatus;

/// Hours the primary stage may stay unresolved before a commit is stuck.
pub const STUCK_AFTER_HOURS: i64 = 4;

/// Outcome of a build, or the anticipated outcome of the build trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildResult {
    /// No tasks have been acted upon.
    New,
    InProgress,
    Succeeded,
    Failed,
    /// Some tasks failed while others are still pending.
    WillFail,
    /// The primary external stage did not resolve in time.
    Stuck,
}

impl BuildResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildResult::New => "New",
            BuildResult::InProgress => "In Progress",
            BuildResult::Succeeded => "Succeeded",
            BuildResult::Failed => "Failed",
            BuildResult::WillFail => "Will Fail",
            BuildResult::Stuck => "Stuck",
        }
    }

    /// Results worth telling the code-review system about.
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            BuildResult::Succeeded | BuildResult::Failed | BuildResult::WillFail
        )
    }

    pub fn is_red(&self) -> bool {
        matches!(self, BuildResult::Failed | BuildResult::WillFail)
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(BuildResult::New),
            "In Progress" => Ok(BuildResult::InProgress),
            "Succeeded" => Ok(BuildResult::Succeeded),
            "Failed" => Ok(BuildResult::Failed),
            "Will Fail" => Ok(BuildResult::WillFail),
            "Stuck" => Ok(BuildResult::Stuck),
            other => Err(format!("unknown build result: {other}")),
        }
    }
}

/// A checklist with its stages and derived build result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStatus {
    pub checklist: Checklist,
    pub stages: Vec<Stage>,
    pub result: BuildResult,
}

impl BuildStatus {
    pub fn new(checklist: Checklist, stages: Vec<Stage>, now: DateTime<Utc>) -> Self {
        let result = compute_build_result(&checklist, &stages, now);
        Self {
            checklist,
            stages,
            result,
        }
    }
}

/// Derive the build result of one checklist.
pub fn compute_build_result(
    checklist: &Checklist,
    stages: &[Stage],
    now: DateTime<Utc>,
) -> BuildResult {
    let mut total = 0usize;
    let mut pending = 0usize;
    let mut failed = 0usize;

    for task in stages.iter().flat_map(|s| s.tasks.iter()) {
        total += 1;
        match task.status {
            TaskStatus::Failed | TaskStatus::Skipped => failed += 1,
            TaskStatus::New | TaskStatus::InProgress => pending += 1,
            TaskStatus::Succeeded => {}
        }
    }

    if total == 0 {
        return BuildResult::New;
    }
    if failed > 0 {
        return if pending > 0 {
            BuildResult::WillFail
        } else {
            BuildResult::Failed
        };
    }
    if pending > 0 {
        let primary_unresolved = stages
            .iter()
            .any(|s| s.name == PRIMARY_STAGE && !s.status().is_final());
        if primary_unresolved && now - checklist.created_at() > Duration::hours(STUCK_AFTER_HOURS) {
            return BuildResult::Stuck;
        }
        return BuildResult::InProgress;
    }
    BuildResult::Succeeded
}

struct Relevance {
    /// Flaky flag of the task as defined by the newest checklist.
    flaky: bool,
    latest_final: Option<TaskStatus>,
}

/// Anticipate the build outcome from statuses ordered newest first.
///
/// Only task names present in the newest checklist are considered. For each
/// of them the most recent final status wins; a failed or skipped one makes
/// the trend `WillFail` unless the task is currently flagged flaky. No
/// relevant tasks at all is also `WillFail`.
pub fn compute_trend(statuses: &[BuildStatus]) -> BuildResult {
    let mut relevant: HashMap<&str, Relevance> = HashMap::new();

    if let Some(newest) = statuses.first() {
        for task in newest.stages.iter().flat_map(|s| s.tasks.iter()) {
            relevant.insert(
                task.name.as_str(),
                Relevance {
                    flaky: task.flaky,
                    latest_final: None,
                },
            );
        }
    }

    for status in statuses {
        for task in status.stages.iter().flat_map(|s| s.tasks.iter()) {
            let Some(entry) = relevant.get_mut(task.name.as_str()) else {
                continue;
            };
            if entry.latest_final.is_some() || !task.status.is_final() {
                continue;
            }
            entry.latest_final = Some(task.status);
            if !entry.flaky && matches!(task.status, TaskStatus::Failed | TaskStatus::Skipped) {
                return BuildResult::WillFail;
            }
        }
    }

    if relevant.is_empty() {
        return BuildResult::WillFail;
    }
    BuildResult::Succeeded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checklist::{AuthorInfo, CommitInfo};
    use crate::id::ChecklistId;
    use crate::stage::group_by_stage;
    use crate::task::{Task, TaskTemplate};

    fn checklist(sha: &str, created_at: DateTime<Utc>) -> Checklist {
        Checklist {
            id: ChecklistId::new(),
            repository: "flutter/flutter".to_string(),
            commit: CommitInfo {
                sha: sha.to_string(),
                author: AuthorInfo::default(),
            },
            create_timestamp: created_at.timestamp_millis(),
        }
    }

    fn task(stage: &str, name: &str, status: TaskStatus, flaky: bool) -> Task {
        let mut task = Task::from_template(
            ChecklistId::new(),
            &TaskTemplate::new(stage, name, &["linux"]),
            Utc::now(),
        );
        task.status = status;
        task.flaky = flaky;
        task
    }

    /// One build per entry, newest first, each a list of (name, status, flaky).
    fn builds(rows: &[&[(&str, TaskStatus, bool)]]) -> Vec<BuildStatus> {
        let now = Utc::now();
        rows.iter()
            .enumerate()
            .map(|(i, tasks)| {
                let tasks = tasks
                    .iter()
                    .map(|(name, status, flaky)| task("devicelab", name, *status, *flaky))
                    .collect();
                BuildStatus::new(checklist(&format!("sha{i}"), now), group_by_stage(tasks), now)
            })
            .collect()
    }

    use TaskStatus::*;

    #[test]
    fn test_trend_empty_ledger_is_failing() {
        assert_eq!(compute_trend(&[]), BuildResult::WillFail);
    }

    #[test]
    fn test_trend_single_success() {
        let statuses = builds(&[&[("foo", Succeeded, false)]]);
        assert_eq!(compute_trend(&statuses), BuildResult::Succeeded);
    }

    #[test]
    fn test_trend_latest_failure_wins() {
        let statuses = builds(&[&[("foo", Failed, false)], &[("foo", Succeeded, false)]]);
        assert_eq!(compute_trend(&statuses), BuildResult::WillFail);
    }

    #[test]
    fn test_trend_latest_success_wins() {
        let statuses = builds(&[&[("foo", Succeeded, false)], &[("foo", Failed, false)]]);
        assert_eq!(compute_trend(&statuses), BuildResult::Succeeded);
    }

    #[test]
    fn test_trend_flaky_failure_is_invisible() {
        let statuses = builds(&[&[("foo", Failed, true)]]);
        assert_eq!(compute_trend(&statuses), BuildResult::Succeeded);
    }

    #[test]
    fn test_trend_marking_flaky_silences_failures() {
        let statuses = builds(&[&[("foo", Failed, true)], &[("foo", Failed, false)]]);
        assert_eq!(compute_trend(&statuses), BuildResult::Succeeded);
    }

    #[test]
    fn test_trend_unmarking_flaky_exposes_failures() {
        let statuses = builds(&[&[("foo", Failed, false)], &[("foo", Failed, true)]]);
        assert_eq!(compute_trend(&statuses), BuildResult::WillFail);
    }

    #[test]
    fn test_trend_flaky_flag_on_pending_task_silences_history() {
        let statuses = builds(&[&[("foo", New, true)], &[("foo", Failed, false)]]);
        assert_eq!(compute_trend(&statuses), BuildResult::Succeeded);
    }

    #[test]
    fn test_trend_one_of_two_failed() {
        let statuses = builds(&[&[("foo", Succeeded, false), ("bar", Failed, false)]]);
        assert_eq!(compute_trend(&statuses), BuildResult::WillFail);
    }

    #[test]
    fn test_trend_anticipates_success_of_unfinished_build() {
        let statuses = builds(&[
            &[("foo", Succeeded, false), ("bar", InProgress, false)],
            &[("foo", Failed, false), ("bar", Succeeded, false)],
        ]);
        assert_eq!(compute_trend(&statuses), BuildResult::Succeeded);
    }

    #[test]
    fn test_trend_skipped_counts_as_failure() {
        let statuses = builds(&[&[("foo", Skipped, false)]]);
        assert_eq!(compute_trend(&statuses), BuildResult::WillFail);
    }

    #[test]
    fn test_trend_ignores_retired_tasks() {
        let statuses = builds(&[&[("foo", Succeeded, false)], &[("retired", Failed, false)]]);
        assert_eq!(compute_trend(&statuses), BuildResult::Succeeded);
    }

    #[test]
    fn test_build_result_counts() {
        let now = Utc::now();
        let cl = checklist("abc", now);
        let result = |tasks: Vec<Task>| compute_build_result(&cl, &group_by_stage(tasks), now);

        assert_eq!(result(vec![]), BuildResult::New);
        assert_eq!(
            result(vec![task("devicelab", "a", Succeeded, false)]),
            BuildResult::Succeeded
        );
        assert_eq!(
            result(vec![
                task("devicelab", "a", Failed, false),
                task("devicelab", "b", New, false)
            ]),
            BuildResult::WillFail
        );
        assert_eq!(
            result(vec![
                task("devicelab", "a", Failed, false),
                task("devicelab", "b", Succeeded, false)
            ]),
            BuildResult::Failed
        );
        assert_eq!(
            result(vec![task("devicelab", "a", InProgress, false)]),
            BuildResult::InProgress
        );
    }

    #[test]
    fn test_unresolved_primary_stage_is_stuck_after_four_hours() {
        let now = Utc::now();
        let stages = group_by_stage(vec![
            task("cirrus", "cirrus", InProgress, false),
            task("devicelab", "a", Succeeded, false),
        ]);

        let fresh = checklist("fresh", now - Duration::hours(3));
        assert_eq!(
            compute_build_result(&fresh, &stages, now),
            BuildResult::InProgress
        );

        let old = checklist("old", now - Duration::hours(5));
        assert_eq!(compute_build_result(&old, &stages, now), BuildResult::Stuck);
    }

    #[test]
    fn test_old_pending_devicelab_is_not_stuck() {
        let now = Utc::now();
        let stages = group_by_stage(vec![
            task("cirrus", "cirrus", Succeeded, false),
            task("devicelab", "a", New, false),
        ]);
        let old = checklist("old", now - Duration::hours(5));
        assert_eq!(
            compute_build_result(&old, &stages, now),
            BuildResult::InProgress
        );
    }

    #[test]
    fn test_build_result_strings_round_trip() {
        for result in [
            BuildResult::New,
            BuildResult::InProgress,
            BuildResult::Succeeded,
            BuildResult::Failed,
            BuildResult::WillFail,
            BuildResult::Stuck,
        ] {
            assert_eq!(result.as_str().parse::<BuildResult>().unwrap(), result);
        }
    }
}
