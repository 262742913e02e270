//! Endpoints called by worker agents.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tollgate_core::{Agent, Checklist, Task};
use tollgate_scheduler::{TaskOutcome, report_task_outcome, reserve_task, update_agent_health};

use crate::AppState;
use crate::auth::AuthenticatedAgent;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reserve-task", post(reserve))
        .route("/update-task-status", post(update_task_status))
        .route("/update-agent-health", post(update_health))
}

/// Both fields are null when there is nothing to do.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReserveTaskResponse {
    task: Option<Task>,
    checklist: Option<Checklist>,
}

async fn reserve(
    State(state): State<AppState>,
    AuthenticatedAgent(agent): AuthenticatedAgent,
) -> Result<Json<ReserveTaskResponse>, ApiError> {
    let reservation = reserve_task(
        state.ledger.as_ref(),
        &agent,
        state.config.scheduler.checklist_window,
        Utc::now(),
    )
    .await?;

    Ok(Json(match reservation {
        Some(r) => ReserveTaskResponse {
            task: Some(r.task),
            checklist: Some(r.checklist),
        },
        None => ReserveTaskResponse {
            task: None,
            checklist: None,
        },
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TaskResponse {
    task: Task,
}

async fn update_task_status(
    State(state): State<AppState>,
    AuthenticatedAgent(agent): AuthenticatedAgent,
    Json(outcome): Json<TaskOutcome>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = report_task_outcome(
        state.ledger.as_ref(),
        state.benchmarks.as_ref(),
        &agent,
        outcome,
        Utc::now(),
    )
    .await?;
    Ok(Json(TaskResponse { task }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpdateAgentHealthRequest {
    is_healthy: bool,
    #[serde(default)]
    health_details: String,
}

async fn update_health(
    State(state): State<AppState>,
    AuthenticatedAgent(agent): AuthenticatedAgent,
    Json(req): Json<UpdateAgentHealthRequest>,
) -> Result<Json<Agent>, ApiError> {
    let agent = update_agent_health(
        state.agents.as_ref(),
        &agent,
        req.is_healthy,
        req.health_details,
        Utc::now(),
    )
    .await?;
    Ok(Json(agent))
}
