//! Operator endpoints guarded by the admin token.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tollgate_core::{Task, TaskId};
use tollgate_scheduler::{authorize_agent, create_agent, reset_task};
use tracing::info;

use crate::AppState;
use crate::auth::Admin;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-agent", post(create))
        .route("/authorize-agent", post(authorize))
        .route("/reset-devicelab-task", post(reset))
}

#[derive(Debug, Deserialize)]
struct CreateAgentRequest {
    #[serde(rename = "AgentID")]
    agent_id: String,
    #[serde(rename = "Capabilities")]
    capabilities: Vec<String>,
}

/// The token is only ever returned here; the server keeps its hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AuthTokenResponse {
    auth_token: String,
}

async fn create(
    State(state): State<AppState>,
    _admin: Admin,
    Json(req): Json<CreateAgentRequest>,
) -> Result<Json<AuthTokenResponse>, ApiError> {
    let (_, auth_token) = create_agent(state.agents.as_ref(), &req.agent_id, req.capabilities).await?;
    Ok(Json(AuthTokenResponse { auth_token }))
}

#[derive(Debug, Deserialize)]
struct AuthorizeAgentRequest {
    #[serde(rename = "AgentID")]
    agent_id: String,
}

async fn authorize(
    State(state): State<AppState>,
    _admin: Admin,
    Json(req): Json<AuthorizeAgentRequest>,
) -> Result<Json<AuthTokenResponse>, ApiError> {
    let auth_token = authorize_agent(state.agents.as_ref(), &req.agent_id).await?;
    Ok(Json(AuthTokenResponse { auth_token }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResetTaskRequest {
    key: TaskId,
}

async fn reset(
    State(state): State<AppState>,
    _admin: Admin,
    Json(req): Json<ResetTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    let task = reset_task(state.ledger.as_ref(), req.key, Utc::now()).await?;
    info!(task = %task.id, name = %task.name, "Task reset by operator");
    Ok(Json(task))
}
