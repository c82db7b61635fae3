//! Types for the sync orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::posting::{OutcomeTally, PostOutcome, PostingError};
use crate::source::SourceError;
use crate::store::StoreError;

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Source processor error.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Posting pipeline error.
    #[error("posting error: {0}")]
    Posting(#[from] PostingError),

    /// State store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A collaborator call exceeded its time budget.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    /// The task's previous run has not finished yet.
    #[error("{0} sync already in progress")]
    InFlight(&'static str),
}

/// Which scheduled task a run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTask {
    Sales,
    Registrations,
}

impl SyncTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTask::Sales => "sales",
            SyncTask::Registrations => "registrations",
        }
    }
}

impl std::fmt::Display for SyncTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stats of a successful sales run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRunStats {
    pub run_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub fetched: usize,
    pub new_count: usize,
    pub duplicate_count: usize,
    /// The source's own error count, independent of posting failures.
    pub error_count: usize,
    pub post_outcomes: Vec<PostOutcome>,
}

/// Stats of a successful registration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRunStats {
    pub run_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub unposted_found: usize,
    pub post_outcomes: Vec<PostOutcome>,
}

/// Stats of a failed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureStats {
    pub run_id: Uuid,
    pub task: SyncTask,
    pub failed_at: DateTime<Utc>,
    pub error_message: String,
    /// Counter value after this failure was recorded.
    pub consecutive_errors: u32,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunStats {
    Sales(SalesRunStats),
    Registration(RegistrationRunStats),
    Failure(FailureStats),
}

impl RunStats {
    pub fn is_success(&self) -> bool {
        !matches!(self, RunStats::Failure(_))
    }

    /// Posted/skipped/failed counts; zero for failures.
    pub fn tally(&self) -> OutcomeTally {
        match self {
            RunStats::Sales(s) => OutcomeTally::from_outcomes(&s.post_outcomes),
            RunStats::Registration(r) => OutcomeTally::from_outcomes(&r.post_outcomes),
            RunStats::Failure(_) => OutcomeTally::default(),
        }
    }
}

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub healthy: bool,
    pub last_run_time: Option<DateTime<Utc>>,
    /// Last sales run (success or failure).
    pub last_run_stats: Option<RunStats>,
    /// Last registration run (success or failure).
    pub last_registration_stats: Option<RunStats>,
    pub consecutive_errors: u32,
    pub max_consecutive_errors: u32,
    pub next_sales_run_time: Option<DateTime<Utc>>,
    pub next_registration_run_time: Option<DateTime<Utc>>,
    /// Earlier of the two next run times. Kept for single-schedule consumers.
    pub next_run_time: Option<DateTime<Utc>>,
    /// Seconds since `last_run_time`.
    pub uptime_secs: Option<i64>,
}

/// Projected fire times per task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpcomingRuns {
    pub sales: Vec<DateTime<Utc>>,
    pub registrations: Vec<DateTime<Utc>>,
}

/// Stats from both runs of a manual sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualSyncStats {
    pub sales: Option<RunStats>,
    pub registrations: Option<RunStats>,
}

/// Result of a manual sync, returned to the caller instead of raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualSyncResult {
    pub success: bool,
    pub stats: ManualSyncStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Earlier of two optional instants, or whichever is present.
pub fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
