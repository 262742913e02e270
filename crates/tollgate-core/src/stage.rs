//! Stages: virtual groupings of the tasks of one checklist.
//!
//! Stages are never stored. They are recomputed from the task list by
//! grouping on `stage_name` and ordering by [`STAGE_PRECEDENCE`].

use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskStatus};

/// Stage names in display and scheduling order. External CI stages come
/// before device-lab stages; unknown names sort after all of these.
pub const STAGE_PRECEDENCE: &[&str] = &[
    "cirrus",
    "chromebot",
    "travis",
    "appveyor",
    "devicelab",
    "devicelab_win",
    "devicelab_ios",
];

/// Stages whose tasks are driven by third-party CI, never by agents.
pub const EXTERNAL_STAGES: &[&str] = &["cirrus", "chromebot", "travis", "appveyor"];

/// The stage that gates whether a commit counts as stuck.
pub const PRIMARY_STAGE: &str = "cirrus";

/// All tasks of one checklist sharing a stage name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub tasks: Vec<Task>,
}

impl Stage {
    pub fn is_external(&self) -> bool {
        is_external_stage(&self.name)
    }

    pub fn status(&self) -> TaskStatus {
        let statuses: Vec<TaskStatus> = self.tasks.iter().map(|t| t.status).collect();
        compute_stage_status(&statuses)
    }
}

pub fn is_external_stage(name: &str) -> bool {
    EXTERNAL_STAGES.contains(&name)
}

fn precedence(name: &str) -> usize {
    STAGE_PRECEDENCE
        .iter()
        .position(|s| *s == name)
        .unwrap_or(STAGE_PRECEDENCE.len())
}

/// Group tasks into stages ordered by precedence (then by name).
///
/// Task order within a stage is preserved.
pub fn group_by_stage(tasks: Vec<Task>) -> Vec<Stage> {
    let mut stages: Vec<Stage> = Vec::new();
    for task in tasks {
        match stages.iter_mut().find(|s| s.name == task.stage_name) {
            Some(stage) => stage.tasks.push(task),
            None => stages.push(Stage {
                name: task.stage_name.clone(),
                tasks: vec![task],
            }),
        }
    }
    stages.sort_by(|a, b| {
        precedence(&a.name)
            .cmp(&precedence(&b.name))
            .then_with(|| a.name.cmp(&b.name))
    });
    stages
}

/// Derive the status of a stage from the statuses of its tasks.
///
/// Mixed combinations that none of the rules cover are reported as
/// `Failed`. An empty stage is `New`.
pub fn compute_stage_status(statuses: &[TaskStatus]) -> TaskStatus {
    let Some(first) = statuses.first() else {
        return TaskStatus::New;
    };
    let all = |s: TaskStatus| statuses.iter().all(|st| *st == s);
    let any = |s: TaskStatus| statuses.iter().any(|st| *st == s);

    if all(TaskStatus::Succeeded) {
        return TaskStatus::Succeeded;
    }
    if any(TaskStatus::Failed) {
        return TaskStatus::Failed;
    }
    if any(TaskStatus::InProgress)
        && statuses.iter().all(|st| {
            matches!(
                st,
                TaskStatus::InProgress | TaskStatus::New | TaskStatus::Succeeded
            )
        })
    {
        return TaskStatus::InProgress;
    }
    if all(*first) {
        return *first;
    }
    TaskStatus::Failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ChecklistId;
    use crate::task::TaskTemplate;
    use chrono::Utc;
    use rstest::rstest;

    use TaskStatus::*;

    fn task(stage: &str, name: &str) -> Task {
        Task::from_template(
            ChecklistId::new(),
            &TaskTemplate::new(stage, name, &["linux"]),
            Utc::now(),
        )
    }

    #[rstest]
    #[case(&[Succeeded, Succeeded], Succeeded)]
    #[case(&[Succeeded, Failed], Failed)]
    #[case(&[Succeeded, InProgress], InProgress)]
    #[case(&[New, InProgress], InProgress)]
    #[case(&[New, New], New)]
    #[case(&[Skipped, Skipped], Skipped)]
    #[case(&[Succeeded, Skipped], Failed)]
    #[case(&[InProgress, Skipped], Failed)]
    #[case(&[Failed, InProgress], Failed)]
    #[case(&[], New)]
    fn test_stage_status(#[case] statuses: &[TaskStatus], #[case] expected: TaskStatus) {
        assert_eq!(compute_stage_status(statuses), expected);
    }

    #[test]
    fn test_group_by_stage_orders_by_precedence() {
        let stages = group_by_stage(vec![
            task("devicelab_ios", "ios_start_up"),
            task("zeta_custom", "custom"),
            task("devicelab", "gallery__start_up"),
            task("cirrus", "cirrus"),
            task("devicelab", "gallery__build"),
            task("alpha_custom", "custom"),
        ]);

        let names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["cirrus", "devicelab", "devicelab_ios", "alpha_custom", "zeta_custom"]
        );
        assert_eq!(stages[1].tasks.len(), 2);
        assert_eq!(stages[1].tasks[0].name, "gallery__start_up");
    }

    #[test]
    fn test_external_stages() {
        let stages = group_by_stage(vec![task("cirrus", "cirrus"), task("devicelab", "x")]);
        assert!(stages[0].is_external());
        assert!(!stages[1].is_external());
    }
}
