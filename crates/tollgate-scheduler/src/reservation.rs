//! Handing tasks to agents.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tollgate_core::stage::group_by_stage;
use tollgate_core::{Agent, Checklist, Task, TaskStatus};
use tollgate_db::{CasOutcome, LedgerRepo};
use tracing::{debug, error, info};

use crate::SchedulerResult;

/// A task reserved for an agent, with the commit it verifies.
#[derive(Debug, Clone, Serialize)]
pub struct Reservation {
    pub task: Task,
    pub checklist: Checklist,
}

/// Reserve the next task `agent` can perform.
///
/// Checklists are scanned newest first within `window`. External stages are
/// left to their reconcilers. Among the matching `New` tasks of a stage the
/// least-attempted goes first. A task lost to a concurrent reservation is
/// skipped in favor of the next candidate.
pub async fn reserve_task(
    ledger: &dyn LedgerRepo,
    agent: &Agent,
    window: usize,
    now: DateTime<Utc>,
) -> SchedulerResult<Option<Reservation>> {
    for checklist in ledger.latest_checklists(window).await? {
        let tasks = ledger.tasks_for_checklist(checklist.id).await?;

        for stage in group_by_stage(tasks) {
            if stage.is_external() {
                continue;
            }

            let mut candidates: Vec<Task> = stage
                .tasks
                .into_iter()
                .filter(|task| task.status == TaskStatus::New)
                .filter(|task| {
                    if task.required_capabilities.is_empty() {
                        error!(
                            task = %task.name,
                            task_id = %task.id,
                            "Task has no required capabilities and cannot be assigned"
                        );
                        return false;
                    }
                    agent.capable_of_performing(task)
                })
                .collect();
            candidates.sort_by_key(|task| task.attempts);

            for candidate in candidates {
                let reserve = |task: &mut Task| {
                    task.transition(TaskStatus::InProgress, now);
                    task.start_timestamp = Some(now);
                    task.attempts += 1;
                    task.reserved_for_agent_id = Some(agent.agent_id.clone());
                    task.reason = None;
                };

                match ledger
                    .update_task_if(candidate.id, TaskStatus::New, &reserve)
                    .await?
                {
                    CasOutcome::Applied(task) => {
                        info!(
                            task = %task.name,
                            task_id = %task.id,
                            agent = %agent.agent_id,
                            attempt = task.attempts,
                            "Reserved task"
                        );
                        return Ok(Some(Reservation {
                            task,
                            checklist: checklist.clone(),
                        }));
                    }
                    CasOutcome::Conflict(found) => {
                        debug!(
                            task_id = %candidate.id,
                            status = %found,
                            "Lost reservation race, trying next candidate"
                        );
                    }
                }
            }
        }
    }

    Ok(None)
}
