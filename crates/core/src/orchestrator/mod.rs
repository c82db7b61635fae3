//! Sync orchestrator for periodic sales and registration syncs.
//!
//! The orchestrator owns two fixed-period schedules:
//! - **Sales**: every 5 minutes, guarded by a consecutive-error trip-wire
//! - **Registrations**: every minute, failures are logged only

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::SyncOrchestrator;
pub use types::{
    earliest, FailureStats, ManualSyncResult, ManualSyncStats, OrchestratorError,
    RegistrationRunStats, RunStats, SalesRunStats, StatusSnapshot, SyncTask, UpcomingRuns,
};
