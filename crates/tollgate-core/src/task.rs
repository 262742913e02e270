//! Tasks: independently pass/fail units of verification work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::checklist::Checklist;
use crate::id::{ChecklistId, TaskId};

/// Number of attempts after which a failure becomes permanent.
pub const MAX_ATTEMPTS: u32 = 2;

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Created but not acted upon.
    New,
    /// Reserved by an agent or running on an external CI.
    #[serde(rename = "In Progress")]
    InProgress,
    Succeeded,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TaskStatus::New | TaskStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::New => "New",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Succeeded => "Succeeded",
            TaskStatus::Failed => "Failed",
            TaskStatus::Skipped => "Skipped",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(TaskStatus::New),
            "In Progress" => Ok(TaskStatus::InProgress),
            "Succeeded" => Ok(TaskStatus::Succeeded),
            "Failed" => Ok(TaskStatus::Failed),
            "Skipped" => Ok(TaskStatus::Skipped),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A unit of work belonging to a checklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub checklist_id: ChecklistId,
    pub stage_name: String,
    pub name: String,
    /// Capabilities an agent must offer to perform this task.
    pub required_capabilities: Vec<String>,
    pub status: TaskStatus,
    /// Human-readable explanation of the current status.
    pub reason: Option<String>,
    pub attempts: u32,
    /// Failures of flaky tasks do not affect the build trend.
    pub flaky: bool,
    /// Handed to the agent; 0 means the agent's own default.
    pub timeout_in_minutes: u32,
    pub reserved_for_agent_id: Option<String>,
    pub create_timestamp: DateTime<Utc>,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub end_timestamp: Option<DateTime<Utc>>,
}

impl Task {
    /// Instantiate a template for a freshly ingested checklist.
    pub fn from_template(
        checklist_id: ChecklistId,
        template: &TaskTemplate,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            checklist_id,
            stage_name: template.stage_name.clone(),
            name: template.name.clone(),
            required_capabilities: template.required_capabilities.clone(),
            status: TaskStatus::New,
            reason: None,
            attempts: 0,
            flaky: template.flaky,
            timeout_in_minutes: template.timeout_in_minutes,
            reserved_for_agent_id: None,
            create_timestamp: created_at,
            start_timestamp: None,
            end_timestamp: None,
        }
    }

    /// Move the task to `status`, maintaining start/end timestamps.
    pub fn transition(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        match status {
            TaskStatus::New => {
                self.start_timestamp = None;
                self.end_timestamp = None;
            }
            TaskStatus::InProgress => {
                self.start_timestamp.get_or_insert(now);
                self.end_timestamp = None;
            }
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Skipped => {
                self.end_timestamp = Some(now);
            }
        }
        self.status = status;
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts < MAX_ATTEMPTS
    }
}

/// Declarative description of a task generated for every commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub stage_name: String,
    pub name: String,
    pub required_capabilities: Vec<String>,
    pub flaky: bool,
    pub timeout_in_minutes: u32,
}

impl TaskTemplate {
    pub fn new(stage_name: impl Into<String>, name: impl Into<String>, capabilities: &[&str]) -> Self {
        Self {
            stage_name: stage_name.into(),
            name: name.into(),
            required_capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            flaky: false,
            timeout_in_minutes: 0,
        }
    }
}

/// A task together with the checklist it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullTask {
    pub task: Task,
    pub checklist: Checklist,
}
