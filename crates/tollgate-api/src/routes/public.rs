//! Unauthenticated dashboard endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tollgate_core::{Agent, BuildResult, BuildStatus};
use tollgate_scheduler::{build_statuses, public_build_status};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/build-status", get(build_status))
        .route("/get-status", get(get_status))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PublicBuildStatus {
    anticipated_build_status: BuildResult,
}

async fn build_status(State(state): State<AppState>) -> Result<Json<PublicBuildStatus>, ApiError> {
    let result = public_build_status(
        state.ledger.as_ref(),
        state.config.scheduler.trend_window,
        Utc::now(),
    )
    .await?;
    Ok(Json(PublicBuildStatus {
        anticipated_build_status: result,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StatusResponse {
    statuses: Vec<BuildStatus>,
    agent_statuses: Vec<Agent>,
}

async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let statuses = build_statuses(
        state.ledger.as_ref(),
        state.config.scheduler.checklist_window,
        Utc::now(),
    )
    .await?;
    let agent_statuses = state.agents.list_agents().await?;
    Ok(Json(StatusResponse {
        statuses,
        agent_statuses,
    }))
}
