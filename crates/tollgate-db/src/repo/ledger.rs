//! The commit ledger: checklists and their tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use std::collections::HashMap;
use tollgate_core::checklist::{AuthorInfo, CommitSyncResult, NewChecklist, SyncOutcome};
use tollgate_core::{Checklist, ChecklistId, CommitInfo, FullTask, Task, TaskId, TaskStatus};
use uuid::Uuid;

use crate::{DbError, DbResult};

/// In-place edit applied to a task under a compare-and-set.
pub type TaskMutation<'a> = dyn Fn(&mut Task) + Send + Sync + 'a;

/// Result of [`LedgerRepo::update_task_if`].
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// The task had the expected status; the mutation was applied and stored.
    Applied(Task),
    /// Another writer got there first; carries the status actually found.
    Conflict(TaskStatus),
}

#[async_trait]
pub trait LedgerRepo: Send + Sync {
    /// Write a batch of commits in one transaction.
    ///
    /// Commits whose checklist already exists are skipped. Synced commits get
    /// `start_timestamp`, `start_timestamp - 1`, ... as ordering keys.
    async fn ingest(
        &self,
        batch: &[NewChecklist],
        start_timestamp: i64,
    ) -> DbResult<Vec<CommitSyncResult>>;

    /// The `limit` most recent checklists, newest first.
    async fn latest_checklists(&self, limit: usize) -> DbResult<Vec<Checklist>>;

    async fn get_checklist(&self, id: ChecklistId) -> DbResult<Checklist>;

    /// The checklist of `sha` in `repository`, if it was ingested.
    async fn find_checklist(&self, repository: &str, sha: &str) -> DbResult<Option<Checklist>>;

    async fn tasks_for_checklist(&self, id: ChecklistId) -> DbResult<Vec<Task>>;

    async fn get_task(&self, id: TaskId) -> DbResult<Task>;

    /// Overwrite the mutable fields of an existing task.
    async fn put_task(&self, task: &Task) -> DbResult<()>;

    /// Apply `apply` to the task only if its stored status is `expected`.
    ///
    /// The read, check and write happen atomically with respect to other
    /// calls for the same task.
    async fn update_task_if(
        &self,
        id: TaskId,
        expected: TaskStatus,
        apply: &TaskMutation<'_>,
    ) -> DbResult<CasOutcome>;

    /// Tasks of the `window` most recent checklists, newest checklist first.
    async fn latest_tasks(&self, window: usize) -> DbResult<Vec<FullTask>>;

    /// Like [`latest_tasks`](Self::latest_tasks) restricted to one task name.
    async fn latest_tasks_by_name(&self, name: &str, window: usize) -> DbResult<Vec<FullTask>>;
}

#[derive(Debug, sqlx::FromRow)]
struct ChecklistRow {
    id: Uuid,
    repository: String,
    commit_sha: String,
    author_login: String,
    author_avatar_url: String,
    create_timestamp: i64,
}

impl From<ChecklistRow> for Checklist {
    fn from(row: ChecklistRow) -> Self {
        Checklist {
            id: ChecklistId::from_uuid(row.id),
            repository: row.repository,
            commit: CommitInfo {
                sha: row.commit_sha,
                author: AuthorInfo {
                    login: row.author_login,
                    avatar_url: row.author_avatar_url,
                },
            },
            create_timestamp: row.create_timestamp,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    checklist_id: Uuid,
    stage_name: String,
    name: String,
    required_capabilities: Vec<String>,
    status: String,
    reason: Option<String>,
    attempts: i32,
    flaky: bool,
    timeout_in_minutes: i32,
    reserved_for_agent_id: Option<String>,
    create_timestamp: DateTime<Utc>,
    start_timestamp: Option<DateTime<Utc>>,
    end_timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for Task {
    type Error = DbError;

    fn try_from(row: TaskRow) -> DbResult<Self> {
        let status = row.status.parse::<TaskStatus>().map_err(DbError::InvalidData)?;
        let attempts = u32::try_from(row.attempts)
            .map_err(|_| DbError::InvalidData(format!("task {} has negative attempts", row.id)))?;
        let timeout_in_minutes = u32::try_from(row.timeout_in_minutes)
            .map_err(|_| DbError::InvalidData(format!("task {} has negative timeout", row.id)))?;

        Ok(Task {
            id: TaskId::from_uuid(row.id),
            checklist_id: ChecklistId::from_uuid(row.checklist_id),
            stage_name: row.stage_name,
            name: row.name,
            required_capabilities: row.required_capabilities,
            status,
            reason: row.reason,
            attempts,
            flaky: row.flaky,
            timeout_in_minutes,
            reserved_for_agent_id: row.reserved_for_agent_id,
            create_timestamp: row.create_timestamp,
            start_timestamp: row.start_timestamp,
            end_timestamp: row.end_timestamp,
        })
    }
}

const SELECT_CHECKLIST: &str = r#"
    SELECT id, repository, commit_sha, author_login, author_avatar_url, create_timestamp
    FROM checklists
"#;

const SELECT_TASK: &str = r#"
    SELECT id, checklist_id, stage_name, name, required_capabilities, status, reason,
           attempts, flaky, timeout_in_minutes, reserved_for_agent_id,
           create_timestamp, start_timestamp, end_timestamp
    FROM tasks
"#;

fn to_i32(value: u32, field: &str) -> DbResult<i32> {
    i32::try_from(value).map_err(|_| DbError::InvalidData(format!("{field} {value} is out of range")))
}

fn to_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

async fn insert_task<'e>(executor: impl PgExecutor<'e>, task: &Task) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO tasks (id, checklist_id, stage_name, name, required_capabilities, status,
                           reason, attempts, flaky, timeout_in_minutes, reserved_for_agent_id,
                           create_timestamp, start_timestamp, end_timestamp)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(task.id.as_uuid())
    .bind(task.checklist_id.as_uuid())
    .bind(&task.stage_name)
    .bind(&task.name)
    .bind(&task.required_capabilities)
    .bind(task.status.as_str())
    .bind(&task.reason)
    .bind(to_i32(task.attempts, "attempts")?)
    .bind(task.flaky)
    .bind(to_i32(task.timeout_in_minutes, "timeout_in_minutes")?)
    .bind(&task.reserved_for_agent_id)
    .bind(task.create_timestamp)
    .bind(task.start_timestamp)
    .bind(task.end_timestamp)
    .execute(executor)
    .await?;
    Ok(())
}

async fn write_task<'e>(executor: impl PgExecutor<'e>, task: &Task) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET status = $2, reason = $3, attempts = $4, flaky = $5, timeout_in_minutes = $6,
            reserved_for_agent_id = $7, start_timestamp = $8, end_timestamp = $9
        WHERE id = $1
        "#,
    )
    .bind(task.id.as_uuid())
    .bind(task.status.as_str())
    .bind(&task.reason)
    .bind(to_i32(task.attempts, "attempts")?)
    .bind(task.flaky)
    .bind(to_i32(task.timeout_in_minutes, "timeout_in_minutes")?)
    .bind(&task.reserved_for_agent_id)
    .bind(task.start_timestamp)
    .bind(task.end_timestamp)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound(format!("task {}", task.id)));
    }
    Ok(())
}

/// PostgreSQL implementation of LedgerRepo.
pub struct PgLedgerRepo {
    pool: PgPool,
}

impl PgLedgerRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn full_tasks(&self, window: usize, name: Option<&str>) -> DbResult<Vec<FullTask>> {
        let checklists = self.latest_checklists(window).await?;
        if checklists.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = checklists.iter().map(|c| *c.id.as_uuid()).collect();

        let sql = format!(
            "{SELECT_TASK} WHERE checklist_id = ANY($1) AND ($2::TEXT IS NULL OR name = $2) \
             ORDER BY stage_name, name"
        );
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(ids)
            .bind(name)
            .fetch_all(&self.pool)
            .await?;

        let mut by_checklist: HashMap<ChecklistId, Vec<Task>> = HashMap::new();
        for row in rows {
            let task = Task::try_from(row)?;
            by_checklist.entry(task.checklist_id).or_default().push(task);
        }

        Ok(assemble_full_tasks(&checklists, by_checklist))
    }
}

/// Pair tasks with their checklists, preserving the checklists' order.
pub(crate) fn assemble_full_tasks(
    checklists: &[Checklist],
    mut by_checklist: HashMap<ChecklistId, Vec<Task>>,
) -> Vec<FullTask> {
    checklists
        .iter()
        .flat_map(|checklist| {
            by_checklist
                .remove(&checklist.id)
                .unwrap_or_default()
                .into_iter()
                .map(move |task| FullTask {
                    task,
                    checklist: checklist.clone(),
                })
        })
        .collect()
}

#[async_trait]
impl LedgerRepo for PgLedgerRepo {
    async fn ingest(
        &self,
        batch: &[NewChecklist],
        start_timestamp: i64,
    ) -> DbResult<Vec<CommitSyncResult>> {
        let mut tx = self.pool.begin().await?;
        let mut results = Vec::with_capacity(batch.len());
        let mut timestamp = start_timestamp;

        for new in batch {
            let existing: Option<(Uuid,)> = sqlx::query_as(
                "SELECT id FROM checklists WHERE repository = $1 AND commit_sha = $2",
            )
            .bind(&new.repository)
            .bind(&new.commit.sha)
            .fetch_optional(&mut *tx)
            .await?;

            if existing.is_some() {
                results.push(CommitSyncResult {
                    commit: new.commit.sha.clone(),
                    outcome: SyncOutcome::Skipped,
                });
                continue;
            }

            let checklist = Checklist {
                id: ChecklistId::new(),
                repository: new.repository.clone(),
                commit: new.commit.clone(),
                create_timestamp: timestamp,
            };
            sqlx::query(
                r#"
                INSERT INTO checklists (id, repository, commit_sha, author_login,
                                        author_avatar_url, create_timestamp)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(checklist.id.as_uuid())
            .bind(&checklist.repository)
            .bind(&checklist.commit.sha)
            .bind(&checklist.commit.author.login)
            .bind(&checklist.commit.author.avatar_url)
            .bind(checklist.create_timestamp)
            .execute(&mut *tx)
            .await?;

            let created_at = checklist.created_at();
            for template in &new.tasks {
                let task = Task::from_template(checklist.id, template, created_at);
                insert_task(&mut *tx, &task).await?;
            }

            results.push(CommitSyncResult {
                commit: new.commit.sha.clone(),
                outcome: SyncOutcome::Synced,
            });
            timestamp -= 1;
        }

        tx.commit().await?;
        Ok(results)
    }

    async fn latest_checklists(&self, limit: usize) -> DbResult<Vec<Checklist>> {
        let sql = format!("{SELECT_CHECKLIST} ORDER BY create_timestamp DESC LIMIT $1");
        let rows = sqlx::query_as::<_, ChecklistRow>(&sql)
            .bind(to_limit(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Checklist::from).collect())
    }

    async fn get_checklist(&self, id: ChecklistId) -> DbResult<Checklist> {
        let sql = format!("{SELECT_CHECKLIST} WHERE id = $1");
        sqlx::query_as::<_, ChecklistRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Checklist::from)
            .ok_or_else(|| DbError::NotFound(format!("checklist {id}")))
    }

    async fn find_checklist(&self, repository: &str, sha: &str) -> DbResult<Option<Checklist>> {
        let sql = format!("{SELECT_CHECKLIST} WHERE repository = $1 AND commit_sha = $2");
        let row = sqlx::query_as::<_, ChecklistRow>(&sql)
            .bind(repository)
            .bind(sha)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Checklist::from))
    }

    async fn tasks_for_checklist(&self, id: ChecklistId) -> DbResult<Vec<Task>> {
        let sql = format!("{SELECT_TASK} WHERE checklist_id = $1 ORDER BY stage_name, name");
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn get_task(&self, id: TaskId) -> DbResult<Task> {
        let sql = format!("{SELECT_TASK} WHERE id = $1");
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("task {id}")))?;
        Task::try_from(row)
    }

    async fn put_task(&self, task: &Task) -> DbResult<()> {
        write_task(&self.pool, task).await
    }

    async fn update_task_if(
        &self,
        id: TaskId,
        expected: TaskStatus,
        apply: &TaskMutation<'_>,
    ) -> DbResult<CasOutcome> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("{SELECT_TASK} WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("task {id}")))?;
        let mut task = Task::try_from(row)?;

        if task.status != expected {
            tx.rollback().await?;
            return Ok(CasOutcome::Conflict(task.status));
        }

        apply(&mut task);
        write_task(&mut *tx, &task).await?;
        tx.commit().await?;

        Ok(CasOutcome::Applied(task))
    }

    async fn latest_tasks(&self, window: usize) -> DbResult<Vec<FullTask>> {
        self.full_tasks(window, None).await
    }

    async fn latest_tasks_by_name(&self, name: &str, window: usize) -> DbResult<Vec<FullTask>> {
        self.full_tasks(window, Some(name)).await
    }
}
