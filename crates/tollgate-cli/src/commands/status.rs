//! Build status reporting.

use anyhow::Result;
use chrono::Utc;
use tollgate_core::build::compute_trend;
use tollgate_core::{BuildStatus, TaskStatus};
use tollgate_scheduler::build_statuses;

use super::Context;

pub async fn show(ctx: &Context, json: bool) -> Result<()> {
    let statuses = build_statuses(&ctx.ledger, ctx.config.scheduler.checklist_window, Utc::now()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    println!("Anticipated build status: {}", compute_trend(&statuses));
    println!();
    for status in &statuses {
        println!("{}", summary_line(status));
    }
    Ok(())
}

fn summary_line(status: &BuildStatus) -> String {
    let tasks: Vec<_> = status.stages.iter().flat_map(|s| s.tasks.iter()).collect();
    let count = |wanted: TaskStatus| tasks.iter().filter(|t| t.status == wanted).count();
    let sha: String = status.checklist.commit.sha.chars().take(10).collect();

    format!(
        "{sha}  {:<10}  {:>3} ok  {:>3} failed  {:>3} running  {:>3} new  {}",
        status.result.as_str(),
        count(TaskStatus::Succeeded),
        count(TaskStatus::Failed) + count(TaskStatus::Skipped),
        count(TaskStatus::InProgress),
        count(TaskStatus::New),
        status.checklist.commit.author.login,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::checklist::{AuthorInfo, CommitInfo};
    use tollgate_core::stage::group_by_stage;
    use tollgate_core::task::TaskTemplate;
    use tollgate_core::{Checklist, ChecklistId, Task};

    #[test]
    fn test_summary_line_counts_tasks() {
        let checklist = Checklist {
            id: ChecklistId::new(),
            repository: "flutter/flutter".to_string(),
            commit: CommitInfo {
                sha: "0123456789abcdef".to_string(),
                author: AuthorInfo {
                    login: "dash".to_string(),
                    avatar_url: String::new(),
                },
            },
            create_timestamp: Utc::now().timestamp_millis(),
        };
        let now = Utc::now();
        let mut failed = Task::from_template(checklist.id, &TaskTemplate::new("devicelab", "a", &["android"]), now);
        failed.status = TaskStatus::Failed;
        let pending = Task::from_template(checklist.id, &TaskTemplate::new("devicelab", "b", &["android"]), now);

        let status = BuildStatus::new(checklist, group_by_stage(vec![failed, pending]), now);
        let line = summary_line(&status);

        assert!(line.starts_with("0123456789  Will Fail"));
        assert!(line.contains("1 failed"));
        assert!(line.contains("1 new"));
        assert!(line.ends_with("dash"));
    }
}
