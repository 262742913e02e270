//! Request authentication extractors.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tollgate_core::Agent;
use tollgate_core::agent::secrets_match;
use tollgate_scheduler::authenticate_agent;

use crate::AppState;
use crate::error::ApiError;

pub const AGENT_ID_HEADER: &str = "Agent-ID";
pub const AGENT_TOKEN_HEADER: &str = "Agent-Auth-Token";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// An agent that presented a valid `Agent-ID` / `Agent-Auth-Token` pair.
pub struct AuthenticatedAgent(pub Agent);

impl FromRequestParts<AppState> for AuthenticatedAgent {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (Some(agent_id), Some(token)) = (
            header(&parts.headers, AGENT_ID_HEADER),
            header(&parts.headers, AGENT_TOKEN_HEADER),
        ) else {
            return Err(ApiError::Unauthorized("missing agent credentials".to_string()));
        };

        let agent = authenticate_agent(state.agents.as_ref(), agent_id, token).await?;
        Ok(Self(agent))
    }
}

/// An operator holding the admin bearer token.
pub struct Admin;

impl FromRequestParts<AppState> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_token.as_deref() else {
            return Err(ApiError::Forbidden("admin endpoints are disabled".to_string()));
        };

        let presented = header(&parts.headers, AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix("Bearer "));
        match presented {
            Some(token) if secrets_match(token, expected) => Ok(Admin),
            _ => Err(ApiError::Unauthorized("invalid admin token".to_string())),
        }
    }
}
