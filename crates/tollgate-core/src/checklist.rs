//! Checklists: one per commit of the tracked repository.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ChecklistId;
use crate::task::TaskTemplate;

/// A commit as reported by the code-review system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub author: AuthorInfo,
}

/// The author of a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorInfo {
    pub login: String,
    pub avatar_url: String,
}

/// The list of tasks to verify for one commit.
///
/// `create_timestamp` doubles as the ordering key: commits ingested in one
/// batch get strictly decreasing values so that sorting by it reconstructs
/// the parent/child order returned by the commit source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub id: ChecklistId,
    /// Repository path in "owner/name" form.
    pub repository: String,
    pub commit: CommitInfo,
    /// Milliseconds since the Unix epoch.
    pub create_timestamp: i64,
}

impl Checklist {
    pub fn created_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.create_timestamp)
            .single()
            .unwrap_or_default()
    }
}

/// A commit about to be ingested together with its task list.
///
/// The ordering key is assigned by the ledger at write time.
#[derive(Debug, Clone)]
pub struct NewChecklist {
    pub repository: String,
    pub commit: CommitInfo,
    pub tasks: Vec<TaskTemplate>,
}

/// What happened to a commit during ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOutcome {
    /// A checklist and its tasks were created.
    Synced,
    /// A checklist for the commit already existed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSyncResult {
    pub commit: String,
    pub outcome: SyncOutcome,
}
