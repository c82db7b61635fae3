//! Mock publisher for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::posting::{PostDraft, PostingError, Publisher};

/// Mock implementation of the Publisher trait.
///
/// Records every published draft and can fail the next publish.
#[derive(Debug, Clone, Default)]
pub struct MockPublisher {
    published: Arc<RwLock<Vec<PostDraft>>>,
    next_error: Arc<RwLock<Option<PostingError>>>,
    clock_refreshes: Arc<AtomicUsize>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drafts published so far.
    pub async fn published(&self) -> Vec<PostDraft> {
        self.published.read().await.clone()
    }

    /// Fail the next publish with the given error.
    pub async fn fail_next(&self, error: PostingError) {
        *self.next_error.write().await = Some(error);
    }

    pub fn clock_refreshes(&self) -> usize {
        self.clock_refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, draft: &PostDraft) -> Result<(), PostingError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        self.published.write().await.push(draft.clone());
        Ok(())
    }

    async fn refresh_clock(&self) -> Result<(), PostingError> {
        self.clock_refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
