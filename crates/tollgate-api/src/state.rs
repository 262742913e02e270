//! Application state.

use sqlx::PgPool;
use std::sync::Arc;
use tollgate_config::SystemConfig;
use tollgate_db::{
    AgentRepo, BenchmarkRepo, LedgerRepo, MemoryStore, PgAgentRepo, PgBenchmarkRepo, PgLedgerRepo,
    PgStatusCacheRepo, StatusCacheRepo,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerRepo>,
    pub agents: Arc<dyn AgentRepo>,
    pub benchmarks: Arc<dyn BenchmarkRepo>,
    pub status_cache: Arc<dyn StatusCacheRepo>,
    pub config: Arc<SystemConfig>,
    /// Bearer token for operator endpoints; they are disabled when unset.
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: SystemConfig, admin_token: Option<String>) -> Self {
        Self {
            ledger: Arc::new(PgLedgerRepo::new(pool.clone())),
            agents: Arc::new(PgAgentRepo::new(pool.clone())),
            benchmarks: Arc::new(PgBenchmarkRepo::new(pool.clone())),
            status_cache: Arc::new(PgStatusCacheRepo::new(pool)),
            config: Arc::new(config),
            admin_token: admin_token.map(Arc::from),
        }
    }

    /// State backed by a single in-memory store.
    pub fn in_memory(store: MemoryStore, config: SystemConfig, admin_token: Option<String>) -> Self {
        Self {
            ledger: Arc::new(store.clone()),
            agents: Arc::new(store.clone()),
            benchmarks: Arc::new(store.clone()),
            status_cache: Arc::new(store),
            config: Arc::new(config),
            admin_token: admin_token.map(Arc::from),
        }
    }
}
