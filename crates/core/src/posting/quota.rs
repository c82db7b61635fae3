//! Rolling-window post quota.
//!
//! The posting platform allows at most `max_posts` posts in any window of
//! `window` length. Unlike a token bucket this never allows a burst above the
//! limit, which is what the platform enforces.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Quota configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Maximum posts per window.
    #[serde(default = "default_max_posts")]
    pub max_posts: u32,
    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_max_posts() -> u32 {
    50
}

fn default_window_secs() -> u64 {
    86_400 // 24 hours
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_posts: default_max_posts(),
            window_secs: default_window_secs(),
        }
    }
}

/// Quota usage snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub max_posts: u32,
    pub window_secs: u64,
    pub used: u32,
    pub next_available_in_ms: Option<u64>,
}

/// A consumed post slot, identified by the instant it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSlot(Instant);

/// Sliding log of post instants within the current window.
pub struct QuotaWindow {
    max_posts: u32,
    window: Duration,
    /// Instants of posts still inside the window, oldest first.
    posts: VecDeque<Instant>,
}

impl QuotaWindow {
    pub fn new(config: &QuotaConfig) -> Self {
        Self {
            max_posts: config.max_posts,
            window: Duration::from_secs(config.window_secs),
            posts: VecDeque::new(),
        }
    }

    /// Try to consume one post slot.
    ///
    /// Returns the slot to pass to [`refund`](Self::refund) if the post is
    /// not delivered, or `Err(wait)` with the time until the oldest post
    /// leaves the window when the quota is exhausted.
    pub fn try_acquire(&mut self) -> Result<QuotaSlot, Duration> {
        let now = Instant::now();
        self.prune(now);

        if (self.posts.len() as u32) < self.max_posts {
            self.posts.push_back(now);
            Ok(QuotaSlot(now))
        } else {
            Err(self.wait_time(now))
        }
    }

    /// Give back a slot whose post was not delivered.
    ///
    /// Slots taken by other posts since then stay in place. A slot that has
    /// already left the window is ignored.
    pub fn refund(&mut self, slot: QuotaSlot) {
        if let Some(pos) = self.posts.iter().rposition(|t| *t == slot.0) {
            self.posts.remove(pos);
        }
    }

    pub fn status(&mut self) -> QuotaStatus {
        let now = Instant::now();
        self.prune(now);
        let used = self.posts.len() as u32;
        QuotaStatus {
            max_posts: self.max_posts,
            window_secs: self.window.as_secs(),
            used,
            next_available_in_ms: if used < self.max_posts {
                None
            } else {
                Some(self.wait_time(now).as_millis() as u64)
            },
        }
    }

    fn wait_time(&self, now: Instant) -> Duration {
        self.posts
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            .unwrap_or(self.window)
    }

    /// Drop posts that have left the window.
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.posts.front() {
            if now.duration_since(*oldest) >= self.window {
                self.posts.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Shared quota window.
///
/// The pipeline consumes slots through it and the server reads usage from
/// it. Cloning shares the same window.
#[derive(Clone)]
pub struct QuotaHandle {
    inner: Arc<Mutex<QuotaWindow>>,
}

impl QuotaHandle {
    pub fn new(config: &QuotaConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QuotaWindow::new(config))),
        }
    }

    pub async fn try_acquire(&self) -> Result<QuotaSlot, Duration> {
        self.inner.lock().await.try_acquire()
    }

    pub async fn refund(&self, slot: QuotaSlot) {
        self.inner.lock().await.refund(slot);
    }

    pub async fn status(&self) -> QuotaStatus {
        self.inner.lock().await.status()
    }
}

impl std::fmt::Debug for QuotaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(max_posts: u32, window_secs: u64) -> QuotaWindow {
        QuotaWindow::new(&QuotaConfig {
            max_posts,
            window_secs,
        })
    }

    #[test]
    fn test_acquire_up_to_limit() {
        let mut quota = window(3, 60);
        for _ in 0..3 {
            assert!(quota.try_acquire().is_ok());
        }
        let wait = quota.try_acquire().unwrap_err();
        assert!(wait <= Duration::from_secs(60));
        assert!(wait > Duration::ZERO);
    }

    #[test]
    fn test_zero_quota_never_allows() {
        let mut quota = window(0, 60);
        assert!(quota.try_acquire().is_err());
    }

    #[test]
    fn test_status_reports_usage() {
        let mut quota = window(2, 60);
        let status = quota.status();
        assert_eq!(status.used, 0);
        assert!(status.next_available_in_ms.is_none());

        quota.try_acquire().unwrap();
        quota.try_acquire().unwrap();

        let status = quota.status();
        assert_eq!(status.used, 2);
        assert_eq!(status.max_posts, 2);
        assert!(status.next_available_in_ms.is_some());
    }

    #[test]
    fn test_refund_frees_slot() {
        let mut quota = window(1, 60);
        let slot = quota.try_acquire().unwrap();
        assert!(quota.try_acquire().is_err());
        quota.refund(slot);
        assert!(quota.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refund_returns_its_own_slot() {
        let mut quota = window(2, 10);
        let failed = quota.try_acquire().unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        quota.try_acquire().unwrap();

        // The newer post keeps its place; the window edge follows it.
        quota.refund(failed);
        quota.try_acquire().unwrap();
        assert_eq!(quota.try_acquire().unwrap_err(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refund_after_slot_left_window_is_ignored() {
        let mut quota = window(1, 10);
        let stale = quota.try_acquire().unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        quota.try_acquire().unwrap();

        quota.refund(stale);
        assert_eq!(quota.status().used, 1);
    }

    #[tokio::test]
    async fn test_handle_clones_share_window() {
        let handle = QuotaHandle::new(&QuotaConfig {
            max_posts: 3,
            window_secs: 60,
        });
        let reader = handle.clone();

        handle.try_acquire().await.unwrap();
        let slot = handle.try_acquire().await.unwrap();
        assert_eq!(reader.status().await.used, 2);

        handle.refund(slot).await;
        assert_eq!(reader.status().await.used, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slots_free_up_after_window() {
        let mut quota = window(2, 10);
        quota.try_acquire().unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        quota.try_acquire().unwrap();
        assert!(quota.try_acquire().is_err());

        // First post leaves the window, second one is still inside.
        tokio::time::advance(Duration::from_secs(7)).await;
        assert!(quota.try_acquire().is_ok());
        assert!(quota.try_acquire().is_err());

        assert_eq!(quota.status().used, 2);
    }
}
