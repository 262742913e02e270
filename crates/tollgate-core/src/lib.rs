//! Core domain types and rules for Tollgate CI coordination.
//!
//! This crate contains:
//! - Checklist, task and agent records
//! - Capability matching and agent credential hashing
//! - Stage grouping and stage status aggregation
//! - Per-checklist build results and the aggregate build trend

pub mod agent;
pub mod build;
pub mod checklist;
pub mod error;
pub mod id;
pub mod stage;
pub mod task;

pub use agent::Agent;
pub use build::{BuildResult, BuildStatus};
pub use checklist::{Checklist, CommitInfo};
pub use error::{Error, Result};
pub use id::{ChecklistId, TaskId};
pub use stage::Stage;
pub use task::{FullTask, MAX_ATTEMPTS, Task, TaskStatus};
