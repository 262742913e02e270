//! Task scheduling for Tollgate.
//!
//! Turns commits into checklists, hands tasks to agents, records their
//! outcomes and keeps the ledger free of stuck work. Periodic sweeps run
//! as independent tokio loops.

pub mod agents;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod outcome;
pub mod reservation;
pub mod status;
pub mod vacuum;

pub use agents::{authenticate_agent, authorize_agent, create_agent, reset_task, update_agent_health};
pub use error::{SchedulerError, SchedulerResult};
pub use ingest::{ManifestSource, NoManifests, ingest_commits};
pub use jobs::spawn_periodic;
pub use outcome::{TaskOutcome, report_task_outcome};
pub use reservation::{Reservation, reserve_task};
pub use status::{build_statuses, public_build_status};
pub use vacuum::{VacuumReport, vacuum};
