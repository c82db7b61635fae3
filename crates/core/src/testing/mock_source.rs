//! Mock source processor for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::source::{SalesBatch, SourceError, SourceProcessor};

/// Mock implementation of the SourceProcessor trait.
///
/// Provides controllable behavior for testing:
/// - Return a configurable batch on every call
/// - Queue one-shot failures or fail every call
/// - Simulate slow upstream feeds
#[derive(Debug, Clone, Default)]
pub struct MockSourceProcessor {
    /// Batch returned by every successful call.
    batch: Arc<RwLock<SalesBatch>>,
    /// Errors returned by the next calls, in order.
    queued_errors: Arc<RwLock<VecDeque<SourceError>>>,
    /// When set, every call fails with this message.
    failing: Arc<RwLock<Option<String>>>,
    /// Delay before each call returns.
    delay: Arc<RwLock<Option<Duration>>>,
    calls: Arc<AtomicUsize>,
}

impl MockSourceProcessor {
    /// Create a new mock source that returns an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch returned by subsequent calls.
    pub async fn set_batch(&self, batch: SalesBatch) {
        *self.batch.write().await = batch;
    }

    /// Fail the next call with the given error.
    pub async fn fail_next(&self, error: SourceError) {
        self.queued_errors.write().await.push_back(error);
    }

    /// Fail every call with `Unavailable(message)`, or stop failing with `None`.
    pub async fn set_failing(&self, message: Option<&str>) {
        *self.failing.write().await = message.map(str::to_string);
    }

    /// Delay every call by `delay`.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().await = delay;
    }

    /// Number of calls received.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceProcessor for MockSourceProcessor {
    async fn process_new_sales(&self) -> Result<SalesBatch, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.queued_errors.write().await.pop_front() {
            return Err(error);
        }
        if let Some(ref message) = *self.failing.read().await {
            return Err(SourceError::Unavailable(message.clone()));
        }

        Ok(self.batch.read().await.clone())
    }
}
