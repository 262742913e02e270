//! API routes.

pub mod admin;
pub mod agent;
pub mod health;
pub mod public;

use crate::AppState;
use axum::Router;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_router())
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .merge(agent::router())
        .merge(admin::router())
        .nest("/public", public::router())
}
