//! Sync orchestrator implementation.
//!
//! Drives two independently scheduled tasks:
//! - Sales: fetch + dedup new sales, post them, trip-wire on repeated failure
//! - Registrations: post a bounded batch of unpublished registrations
//!
//! All mutable state (run flag, counters, stats, schedule handles) sits behind
//! one async mutex, so every transition is serialized.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::posting::{OutcomeTally, PostOutcome, PostingGate, PostingPipeline};
use crate::scheduler::{FireFn, ScheduleHandle, Scheduler};
use crate::source::{SalesBatch, SourceProcessor};
use crate::store::{parse_enabled_flag, StateStore, ORCHESTRATOR_ENABLED_KEY};

use super::config::OrchestratorConfig;
use super::types::{
    earliest, FailureStats, ManualSyncResult, ManualSyncStats, OrchestratorError,
    RegistrationRunStats, RunStats, SalesRunStats, StatusSnapshot, SyncTask, UpcomingRuns,
};

/// Mutable orchestrator state.
#[derive(Default)]
struct OrchestratorState {
    running: bool,
    consecutive_errors: u32,
    last_run_time: Option<DateTime<Utc>>,
    last_run_stats: Option<RunStats>,
    last_registration_stats: Option<RunStats>,
    sales_handle: Option<ScheduleHandle>,
    registration_handle: Option<ScheduleHandle>,
}

impl OrchestratorState {
    fn has_handles(&self) -> bool {
        self.sales_handle.is_some() || self.registration_handle.is_some()
    }

    /// Cancel and drop both handles. Returns whether any existed.
    fn discard_handles(&mut self) -> bool {
        let mut had_any = false;
        for handle in [&mut self.sales_handle, &mut self.registration_handle] {
            if let Some(mut h) = handle.take() {
                h.cancel();
                had_any = true;
            }
        }
        had_any
    }
}

/// Re-entrancy guard for one scheduled task.
struct TaskSlot {
    in_flight: AtomicBool,
}

impl TaskSlot {
    fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
        }
    }

    fn try_acquire(&self) -> Option<SlotGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotGuard(&self.in_flight))
    }
}

struct SlotGuard<'a>(&'a AtomicBool);

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct OrchestratorInner {
    config: OrchestratorConfig,
    source: Arc<dyn SourceProcessor>,
    pipeline: Arc<dyn PostingPipeline>,
    store: Arc<dyn StateStore>,
    gate: PostingGate,
    scheduler: Scheduler,
    state: Mutex<OrchestratorState>,
    sales_slot: TaskSlot,
    registration_slot: TaskSlot,
}

/// The sync orchestrator. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("config", &self.inner.config)
            .field("gate", &self.inner.gate)
            .finish()
    }
}

impl SyncOrchestrator {
    /// Create a new orchestrator. Nothing is scheduled until [`start`](Self::start).
    pub fn new(
        config: OrchestratorConfig,
        source: Arc<dyn SourceProcessor>,
        pipeline: Arc<dyn PostingPipeline>,
        store: Arc<dyn StateStore>,
        gate: PostingGate,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                config,
                source,
                pipeline,
                store,
                gate,
                scheduler: Scheduler::new(),
                state: Mutex::new(OrchestratorState::default()),
                sales_slot: TaskSlot::new(),
                registration_slot: TaskSlot::new(),
            }),
        }
    }

    /// Restore the enabled state persisted by a previous process.
    ///
    /// A read failure leaves the orchestrator stopped.
    pub async fn initialize_from_store(&self) {
        match self.inner.store.get_value(ORCHESTRATOR_ENABLED_KEY) {
            Ok(value) if parse_enabled_flag(value.as_deref()) => {
                info!("Orchestrator was enabled before restart; starting");
                self.start().await;
            }
            Ok(_) => info!("Orchestrator persisted as disabled; not starting"),
            Err(e) => error!(
                error = %e,
                "Failed to read persisted orchestrator state; staying stopped"
            ),
        }
    }

    /// Start both schedules. Restarts cleanly if already running.
    pub async fn start(&self) {
        let mut state = self.inner.state.lock().await;

        if state.has_handles() {
            info!("Orchestrator already running; restarting schedules");
            state.discard_handles();
            state.running = false;
        }

        let sales = self.inner.scheduler.schedule(
            SyncTask::Sales.as_str(),
            self.inner.config.sales_interval(),
            self.fire_fn(SyncTask::Sales),
        );
        let registrations = self.inner.scheduler.schedule(
            SyncTask::Registrations.as_str(),
            self.inner.config.registration_interval(),
            self.fire_fn(SyncTask::Registrations),
        );

        info!(
            next_sales_run = ?sales.next_fire_time(),
            next_registration_run = ?registrations.next_fire_time(),
            "Orchestrator started"
        );

        state.sales_handle = Some(sales);
        state.registration_handle = Some(registrations);
        state.running = true;
        metrics::ORCHESTRATOR_RUNNING.set(1);
        self.persist_enabled(true);
    }

    /// Stop both schedules. Returns `false` (and changes nothing) if nothing
    /// was scheduled.
    pub async fn stop(&self) -> bool {
        let mut state = self.inner.state.lock().await;

        if !state.discard_handles() {
            info!("Orchestrator not running; nothing to stop");
            return false;
        }

        state.running = false;
        metrics::ORCHESTRATOR_RUNNING.set(0);
        self.persist_enabled(false);
        info!("Orchestrator stopped");
        true
    }

    /// Stop unconditionally, whatever the current state.
    pub async fn force_stop(&self) {
        let mut state = self.inner.state.lock().await;
        self.halt(&mut state);
        warn!("Orchestrator force-stopped");
    }

    /// Clear the consecutive error counter. Does not restart anything.
    pub async fn reset_error_counter(&self) {
        let mut state = self.inner.state.lock().await;
        let previous = state.consecutive_errors;
        state.consecutive_errors = 0;
        metrics::CONSECUTIVE_ERRORS.set(0);
        info!(previous, "Consecutive error counter reset");
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.running
    }

    pub async fn is_healthy(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.running && state.consecutive_errors < self.inner.config.max_consecutive_errors
    }

    pub async fn consecutive_errors(&self) -> u32 {
        self.inner.state.lock().await.consecutive_errors
    }

    /// Current status snapshot.
    pub async fn status(&self) -> StatusSnapshot {
        let state = self.inner.state.lock().await;
        let max = self.inner.config.max_consecutive_errors;

        let next_sales_run_time = state
            .sales_handle
            .as_ref()
            .and_then(ScheduleHandle::next_fire_time);
        let next_registration_run_time = state
            .registration_handle
            .as_ref()
            .and_then(ScheduleHandle::next_fire_time);

        StatusSnapshot {
            running: state.running,
            healthy: state.running && state.consecutive_errors < max,
            last_run_time: state.last_run_time,
            last_run_stats: state.last_run_stats.clone(),
            last_registration_stats: state.last_registration_stats.clone(),
            consecutive_errors: state.consecutive_errors,
            max_consecutive_errors: max,
            next_sales_run_time,
            next_registration_run_time,
            next_run_time: earliest(next_sales_run_time, next_registration_run_time),
            uptime_secs: state
                .last_run_time
                .map(|t| (Utc::now() - t).num_seconds()),
        }
    }

    /// The next `count` fire times of each task. Empty while stopped.
    pub async fn upcoming_runs(&self, count: usize) -> UpcomingRuns {
        let state = self.inner.state.lock().await;
        UpcomingRuns {
            sales: state
                .sales_handle
                .as_ref()
                .map(|h| h.upcoming(count))
                .unwrap_or_default(),
            registrations: state
                .registration_handle
                .as_ref()
                .map(|h| h.upcoming(count))
                .unwrap_or_default(),
        }
    }

    /// Run sales then registrations now, outside the schedule.
    ///
    /// Works whether or not the orchestrator is running and leaves the
    /// schedules untouched. A task whose scheduled run is in flight is not
    /// run again and counts as a failure of the manual sync.
    pub async fn trigger_manual_sync(&self) -> ManualSyncResult {
        info!("Manual sync triggered");
        let mut errors = Vec::new();

        let sales = match self.inner.sales_slot.try_acquire() {
            Some(_guard) => {
                let stats = self.execute_sales_run().await;
                if let RunStats::Failure(ref failure) = stats {
                    errors.push(format!("sales: {}", failure.error_message));
                }
                Some(stats)
            }
            None => {
                errors.push(OrchestratorError::InFlight(SyncTask::Sales.as_str()).to_string());
                None
            }
        };

        let registrations = match self.inner.registration_slot.try_acquire() {
            Some(_guard) => {
                let stats = self.execute_registration_run().await;
                if let RunStats::Failure(ref failure) = stats {
                    errors.push(format!("registrations: {}", failure.error_message));
                }
                Some(stats)
            }
            None => {
                errors.push(
                    OrchestratorError::InFlight(SyncTask::Registrations.as_str()).to_string(),
                );
                None
            }
        };

        let success = errors.is_empty();
        if success {
            info!("Manual sync completed");
        } else {
            warn!(errors = ?errors, "Manual sync completed with errors");
        }

        ManualSyncResult {
            success,
            stats: ManualSyncStats {
                sales,
                registrations,
            },
            error: (!success).then(|| errors.join("; ")),
        }
    }

    /// Scheduled entry point for the sales task.
    pub async fn run_sales_sync(&self) {
        let Some(_guard) = self.claim(SyncTask::Sales, &self.inner.sales_slot).await else {
            return;
        };
        self.execute_sales_run().await;
    }

    /// Scheduled entry point for the registration task.
    pub async fn run_registration_sync(&self) {
        let Some(_guard) = self
            .claim(SyncTask::Registrations, &self.inner.registration_slot)
            .await
        else {
            return;
        };
        self.execute_registration_run().await;
    }

    /// Check the running flag and take the task slot, or log why not.
    async fn claim<'a>(&self, task: SyncTask, slot: &'a TaskSlot) -> Option<SlotGuard<'a>> {
        if !self.is_running().await {
            debug!(task = %task, "Orchestrator stopped; ignoring fire");
            metrics::SKIPPED_FIRES
                .with_label_values(&[task.as_str(), "not_running"])
                .inc();
            return None;
        }

        let guard = slot.try_acquire();
        if guard.is_none() {
            warn!(task = %task, "Previous run still in flight; skipping this fire");
            metrics::SKIPPED_FIRES
                .with_label_values(&[task.as_str(), "in_flight"])
                .inc();
        }
        guard
    }

    fn fire_fn(&self, task: SyncTask) -> FireFn {
        let weak: Weak<OrchestratorInner> = Arc::downgrade(&self.inner);
        Arc::new(move || {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let orchestrator = SyncOrchestrator { inner };
                match task {
                    SyncTask::Sales => orchestrator.run_sales_sync().await,
                    SyncTask::Registrations => orchestrator.run_registration_sync().await,
                }
            }
            .boxed()
        })
    }

    // ---------------------------------------------------------------------
    // Sales
    // ---------------------------------------------------------------------

    async fn execute_sales_run(&self) -> RunStats {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        debug!(%run_id, task = "sales", "Sales sync starting");

        let result = self.sales_pass(run_id).await;
        metrics::SYNC_RUN_DURATION
            .with_label_values(&["sales"])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(stats) => {
                metrics::SYNC_RUNS
                    .with_label_values(&["sales", "success"])
                    .inc();
                self.record_sales_success(&stats).await;
                RunStats::Sales(stats)
            }
            Err(e) => {
                metrics::SYNC_RUNS
                    .with_label_values(&["sales", "failure"])
                    .inc();
                RunStats::Failure(self.record_sales_failure(run_id, &e).await)
            }
        }
    }

    async fn sales_pass(&self, run_id: Uuid) -> Result<SalesRunStats, OrchestratorError> {
        let pipeline = &self.inner.pipeline;

        self.bounded("refresh_time_context", pipeline.refresh_time_context())
            .await?;

        let batch = self
            .bounded("process_new_sales", self.inner.source.process_new_sales())
            .await?;

        let post_outcomes = self.post_sales(run_id, &batch).await?;

        let tally = OutcomeTally::from_outcomes(&post_outcomes);
        metrics::record_post_tally("sales", &tally);
        info!(
            %run_id,
            fetched = batch.fetched,
            new = batch.new_count,
            duplicates = batch.duplicate_count,
            errors = batch.error_count,
            posted = tally.posted,
            skipped = tally.skipped,
            failed = tally.failed,
            "Sales sync completed"
        );

        Ok(SalesRunStats {
            run_id,
            finished_at: Utc::now(),
            fetched: batch.fetched,
            new_count: batch.new_count,
            duplicate_count: batch.duplicate_count,
            error_count: batch.error_count,
            post_outcomes,
        })
    }

    /// Hand new sales to the pipeline if both the gate and the feature flag
    /// allow it.
    async fn post_sales(
        &self,
        run_id: Uuid,
        batch: &SalesBatch,
    ) -> Result<Vec<PostOutcome>, OrchestratorError> {
        if !batch.has_new_records() {
            return Ok(Vec::new());
        }

        let pipeline = &self.inner.pipeline;
        let settings = self.bounded("get_settings", pipeline.get_settings()).await?;
        let gate_open = self.inner.gate.is_auto_posting_enabled();

        if !(gate_open && settings.enabled) {
            info!(
                %run_id,
                new = batch.new_count,
                gate_open,
                sales_posting_enabled = settings.enabled,
                "Posting disabled; new sales recorded without posting"
            );
            return Ok(Vec::new());
        }

        self.bounded(
            "post_sales",
            pipeline.process_new_sales(&batch.records, &settings),
        )
        .await
    }

    async fn record_sales_success(&self, stats: &SalesRunStats) {
        let mut state = self.inner.state.lock().await;
        state.consecutive_errors = 0;
        state.last_run_time = Some(stats.finished_at);
        state.last_run_stats = Some(RunStats::Sales(stats.clone()));
        metrics::CONSECUTIVE_ERRORS.set(0);
    }

    /// Count the failure and trip the wire when the threshold is reached.
    async fn record_sales_failure(&self, run_id: Uuid, err: &OrchestratorError) -> FailureStats {
        let mut state = self.inner.state.lock().await;
        state.consecutive_errors += 1;
        let consecutive_errors = state.consecutive_errors;
        let max = self.inner.config.max_consecutive_errors;
        metrics::CONSECUTIVE_ERRORS.set(i64::from(consecutive_errors));

        let failure = FailureStats {
            run_id,
            task: SyncTask::Sales,
            failed_at: Utc::now(),
            error_message: err.to_string(),
            consecutive_errors,
        };
        state.last_run_stats = Some(RunStats::Failure(failure.clone()));

        if consecutive_errors >= max {
            error!(
                alert = "critical",
                %run_id,
                consecutive_errors,
                max_consecutive_errors = max,
                error = %err,
                "Sales sync failed too many times in a row; stopping orchestrator"
            );
            self.halt(&mut state);
            metrics::TRIP_WIRE_STOPS.inc();
        } else {
            error!(
                %run_id,
                consecutive_errors,
                max_consecutive_errors = max,
                error = %err,
                "Sales sync failed"
            );
        }

        failure
    }

    // ---------------------------------------------------------------------
    // Registrations
    // ---------------------------------------------------------------------

    async fn execute_registration_run(&self) -> RunStats {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        debug!(%run_id, task = "registrations", "Registration sync starting");

        let result = self.registration_pass(run_id).await;
        metrics::SYNC_RUN_DURATION
            .with_label_values(&["registrations"])
            .observe(started.elapsed().as_secs_f64());

        let mut state = self.inner.state.lock().await;
        let stats = match result {
            Ok(stats) => {
                metrics::SYNC_RUNS
                    .with_label_values(&["registrations", "success"])
                    .inc();
                RunStats::Registration(stats)
            }
            Err(e) => {
                // Registration failures are reported but never count toward
                // the trip-wire.
                metrics::SYNC_RUNS
                    .with_label_values(&["registrations", "failure"])
                    .inc();
                warn!(%run_id, error = %e, "Registration sync failed");
                RunStats::Failure(FailureStats {
                    run_id,
                    task: SyncTask::Registrations,
                    failed_at: Utc::now(),
                    error_message: e.to_string(),
                    consecutive_errors: state.consecutive_errors,
                })
            }
        };
        state.last_registration_stats = Some(stats.clone());
        stats
    }

    async fn registration_pass(
        &self,
        run_id: Uuid,
    ) -> Result<RegistrationRunStats, OrchestratorError> {
        let records = self
            .inner
            .store
            .get_unpublished_registrations(self.inner.config.registration_batch_size)?;

        if records.is_empty() {
            debug!(%run_id, "No unpublished registrations");
            return Ok(RegistrationRunStats {
                run_id,
                finished_at: Utc::now(),
                unposted_found: 0,
                post_outcomes: Vec::new(),
            });
        }

        let pipeline = &self.inner.pipeline;
        let settings = self.bounded("get_settings", pipeline.get_settings()).await?;
        let gate_open = self.inner.gate.is_auto_posting_enabled();

        let post_outcomes = if gate_open && settings.enabled && settings.registrations_enabled {
            self.bounded(
                "post_registrations",
                pipeline.process_new_registrations(&records, &settings),
            )
            .await?
        } else {
            debug!(
                %run_id,
                unposted = records.len(),
                gate_open,
                posting_enabled = settings.enabled,
                registrations_enabled = settings.registrations_enabled,
                "Registration posting disabled"
            );
            Vec::new()
        };

        let tally = OutcomeTally::from_outcomes(&post_outcomes);
        metrics::record_post_tally("registrations", &tally);
        info!(
            %run_id,
            unposted = records.len(),
            posted = tally.posted,
            skipped = tally.skipped,
            failed = tally.failed,
            "Registration sync completed"
        );

        Ok(RegistrationRunStats {
            run_id,
            finished_at: Utc::now(),
            unposted_found: records.len(),
            post_outcomes,
        })
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    /// Bound a collaborator call by the configured timeout.
    async fn bounded<T, E>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, E>>,
    ) -> Result<T, OrchestratorError>
    where
        OrchestratorError: From<E>,
    {
        let limit = self.inner.config.collaborator_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result.map_err(OrchestratorError::from),
            Err(_) => Err(OrchestratorError::Timeout {
                operation,
                secs: limit.as_secs(),
            }),
        }
    }

    /// Drop both schedules, mark stopped and persist. Caller holds the lock.
    fn halt(&self, state: &mut OrchestratorState) {
        state.discard_handles();
        state.running = false;
        metrics::ORCHESTRATOR_RUNNING.set(0);
        self.persist_enabled(false);
    }

    /// Best-effort write of the enabled flag.
    fn persist_enabled(&self, enabled: bool) {
        let value = if enabled { "true" } else { "false" };
        if let Err(e) = self.inner.store.set_value(ORCHESTRATOR_ENABLED_KEY, value) {
            warn!(error = %e, enabled, "Failed to persist orchestrator state");
        }
    }
}
