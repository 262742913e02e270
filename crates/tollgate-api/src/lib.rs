//! HTTP surface of Tollgate.
//!
//! Thin axum handlers over the scheduler, plus the wiring of the periodic
//! background jobs.

pub mod auth;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod state;

pub use state::AppState;
