//! Fixed-period scheduler.
//!
//! Tasks fire on wall-clock boundaries that are integer multiples of their
//! period since the Unix epoch, so a 5 minute task fires at :00, :05, :10 and
//! a 1 minute task at every minute. Each fire runs as its own tokio task; a
//! slow fire never delays the next one. Boundaries missed while the runtime
//! was busy are skipped, not queued.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Most fire times [`ScheduleHandle::upcoming`] returns in one call.
pub const MAX_UPCOMING: usize = 1_000;

/// Callback invoked on every fire.
pub type FireFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Spawns periodic tasks on the current tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct Scheduler;

impl Scheduler {
    pub fn new() -> Self {
        Self
    }

    /// Start a periodic task. The returned handle owns it: cancelling or
    /// dropping the handle stops future fires.
    pub fn schedule(&self, name: &str, period: Duration, on_fire: FireFn) -> ScheduleHandle {
        // A zero period would spin; 1ms is the finest boundary we compute.
        let period = period.max(Duration::from_millis(1));
        let first = next_boundary(Utc::now(), period);
        let next_fire = Arc::new(Mutex::new(Some(first)));

        let task_name = name.to_string();
        let shared_next = Arc::clone(&next_fire);
        let task = tokio::spawn(async move {
            let mut target = first;
            loop {
                let delay = (target - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(delay).await;

                debug!(task = %task_name, fire_time = %target, "Schedule fired");
                tokio::spawn(on_fire());

                // Never fire the same boundary twice, even if the wall clock
                // reads slightly early after waking.
                target = next_boundary(Utc::now().max(target), period);
                *shared_next.lock().unwrap() = Some(target);
            }
        });

        ScheduleHandle {
            name: name.to_string(),
            period,
            next_fire,
            task: Some(task),
        }
    }
}

/// First boundary strictly after `now` for the given period.
pub fn next_boundary(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let period_ms = (period.as_millis() as i64).max(1);
    let now_ms = now.timestamp_millis();
    let next_ms = (now_ms.div_euclid(period_ms) + 1) * period_ms;
    DateTime::from_timestamp_millis(next_ms).unwrap_or(now)
}

/// A running periodic task.
pub struct ScheduleHandle {
    name: String,
    period: Duration,
    next_fire: Arc<Mutex<Option<DateTime<Utc>>>>,
    task: Option<JoinHandle<()>>,
}

impl ScheduleHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the handle will fire again.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Next instant the task will fire, `None` once cancelled.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        if !self.is_active() {
            return None;
        }
        *self.next_fire.lock().unwrap()
    }

    /// The next `count` fire times, capped at [`MAX_UPCOMING`].
    ///
    /// Fires sit on exact period boundaries, so stepping by the period from
    /// the next fire reproduces the real schedule. The list ends early if a
    /// fire time would overflow the calendar.
    pub fn upcoming(&self, count: usize) -> Vec<DateTime<Utc>> {
        let Some(next) = self.next_fire_time() else {
            return Vec::new();
        };
        let Ok(step) = chrono::Duration::from_std(self.period) else {
            return vec![next];
        };
        (0..count.min(MAX_UPCOMING))
            .map_while(|k| {
                let k = i32::try_from(k).ok()?;
                next.checked_add_signed(step.checked_mul(k)?)
            })
            .collect()
    }

    /// Stop future fires. A fire already in progress runs to completion.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            *self.next_fire.lock().unwrap() = None;
            info!(task = %self.name, "Schedule cancelled");
        }
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for ScheduleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleHandle")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("next_fire", &self.next_fire_time())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_fire(counter: Arc<AtomicUsize>) -> FireFn {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[test]
    fn test_next_boundary_five_minutes() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 7, 42).unwrap();
        let next = next_boundary(now, Duration::from_secs(300));
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 10, 10, 0).unwrap());
    }

    #[test]
    fn test_next_boundary_is_strictly_after_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 10, 0).unwrap();
        let next = next_boundary(now, Duration::from_secs(60));
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 10, 11, 0).unwrap());
    }

    #[tokio::test]
    async fn test_handle_reports_aligned_next_fire() {
        let scheduler = Scheduler::new();
        let mut handle = scheduler.schedule(
            "sales",
            Duration::from_secs(300),
            counting_fire(Arc::new(AtomicUsize::new(0))),
        );

        let next = handle.next_fire_time().unwrap();
        assert_eq!(next.timestamp() % 300, 0);
        assert!(next > Utc::now());
        assert!(handle.is_active());

        handle.cancel();
        assert!(!handle.is_active());
        assert!(handle.next_fire_time().is_none());
        assert!(handle.upcoming(3).is_empty());
    }

    #[tokio::test]
    async fn test_upcoming_steps_by_period() {
        let scheduler = Scheduler::new();
        let handle = scheduler.schedule(
            "sales",
            Duration::from_secs(300),
            counting_fire(Arc::new(AtomicUsize::new(0))),
        );

        let t = handle.next_fire_time().unwrap();
        let upcoming = handle.upcoming(3);
        assert_eq!(
            upcoming,
            vec![
                t,
                t + chrono::Duration::minutes(5),
                t + chrono::Duration::minutes(10)
            ]
        );
    }

    #[tokio::test]
    async fn test_upcoming_caps_large_counts() {
        let scheduler = Scheduler::new();
        let handle = scheduler.schedule(
            "registrations",
            Duration::from_secs(60),
            counting_fire(Arc::new(AtomicUsize::new(0))),
        );

        let t = handle.next_fire_time().unwrap();
        let upcoming = handle.upcoming(1 << 32);
        assert_eq!(upcoming.len(), MAX_UPCOMING);
        assert_eq!(upcoming[0], t);
        assert_eq!(
            upcoming[MAX_UPCOMING - 1],
            t + chrono::Duration::minutes(MAX_UPCOMING as i64 - 1)
        );
        assert!(handle.upcoming(0).is_empty());
    }

    #[tokio::test]
    async fn test_upcoming_stops_at_calendar_end() {
        let scheduler = Scheduler::new();
        // Roughly 100k years per step; the calendar ends within a few fires.
        let handle = scheduler.schedule(
            "far",
            Duration::from_secs(100_000 * 365 * 86_400),
            counting_fire(Arc::new(AtomicUsize::new(0))),
        );

        let upcoming = handle.upcoming(10);
        assert!(!upcoming.is_empty());
        assert!(upcoming.len() < 10);
        assert!(upcoming.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_fires_repeatedly_until_cancelled() {
        let counter = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new();
        let mut handle = scheduler.schedule(
            "fast",
            Duration::from_millis(20),
            counting_fire(Arc::clone(&counter)),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.cancel();
        // Let a fire spawned just before the cancel finish.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let fired = counter.load(Ordering::SeqCst);
        assert!(fired >= 3, "expected at least 3 fires, got {}", fired);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(counter.load(Ordering::SeqCst), fired);
    }

    #[tokio::test]
    async fn test_drop_stops_fires() {
        let counter = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new();
        let handle = scheduler.schedule(
            "fast",
            Duration::from_millis(20),
            counting_fire(Arc::clone(&counter)),
        );
        drop(handle);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
