//! Posting outcomes, settings and errors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Result of handing one record to the posting pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PostOutcome {
    /// The record was published.
    Posted,
    /// The record was deliberately not published.
    Skipped { reason: String },
    /// Publishing was attempted and failed (including quota exhaustion).
    Failed { reason: String },
}

impl PostOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Posted/skipped/failed counts over a batch of outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeTally {
    pub posted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl OutcomeTally {
    pub fn from_outcomes(outcomes: &[PostOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut tally, outcome| {
            match outcome {
                PostOutcome::Posted => tally.posted += 1,
                PostOutcome::Skipped { .. } => tally.skipped += 1,
                PostOutcome::Failed { .. } => tally.failed += 1,
            }
            tally
        })
    }
}

/// Per-feature posting switches.
///
/// These are checked in addition to the global [`super::PostingGate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostingSettings {
    /// Post sales (and gate registration posting).
    #[serde(default)]
    pub enabled: bool,
    /// Post registrations. Only effective when `enabled` is also set.
    #[serde(default)]
    pub registrations_enabled: bool,
    /// Sales below this price are skipped.
    #[serde(default)]
    pub min_sale_price: f64,
}

/// Shared, updatable posting settings.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<PostingSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: PostingSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Snapshot of the current settings.
    pub async fn get(&self) -> PostingSettings {
        self.inner.read().await.clone()
    }

    /// Replace the current settings.
    pub async fn set(&self, settings: PostingSettings) {
        *self.inner.write().await = settings;
    }
}

/// A rendered post ready for a publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDraft {
    /// "sale" or "registration".
    pub kind: String,
    /// Id of the underlying record.
    pub record_id: String,
    pub text: String,
    #[serde(default)]
    pub link: Option<String>,
}

/// Errors from the posting pipeline or a publisher.
#[derive(Debug, Error)]
pub enum PostingError {
    /// The posting platform could not be reached.
    #[error("posting platform unavailable: {0}")]
    Unavailable(String),

    /// The platform quota is exhausted.
    #[error("posting quota exceeded, retry in {retry_after_secs}s")]
    QuotaExceeded { retry_after_secs: u64 },

    /// The platform refused the post.
    #[error("post rejected: {0}")]
    Rejected(String),

    /// Credentials or settings are absent.
    #[error("posting configuration missing: {0}")]
    ConfigurationMissing(String),
}
