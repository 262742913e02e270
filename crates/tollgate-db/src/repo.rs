//! Repository traits and implementations.

pub mod agent;
pub mod benchmark;
pub mod ledger;
pub mod status_cache;

pub use agent::{AgentRepo, PgAgentRepo};
pub use benchmark::{BenchmarkRepo, BenchmarkValue, PgBenchmarkRepo};
pub use ledger::{CasOutcome, LedgerRepo, PgLedgerRepo, TaskMutation};
pub use status_cache::{GLOBAL_BUILDER, PgStatusCacheRepo, StatusCacheKey, StatusCacheRepo};
