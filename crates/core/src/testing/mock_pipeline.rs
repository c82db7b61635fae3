//! Mock posting pipeline for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::posting::{PostOutcome, PostingError, PostingPipeline, PostingSettings};
use crate::source::{RegistrationRecord, SaleRecord};

/// Mock implementation of the PostingPipeline trait.
///
/// Provides controllable behavior for testing:
/// - Configurable settings (everything enabled by default)
/// - Scripted outcomes, otherwise every record is `Posted`
/// - Records every batch it receives
/// - Queued failures and a configurable delay for sales batches
#[derive(Debug, Clone)]
pub struct MockPostingPipeline {
    settings: Arc<RwLock<PostingSettings>>,
    sales_outcomes: Arc<RwLock<Option<Vec<PostOutcome>>>>,
    registration_outcomes: Arc<RwLock<Option<Vec<PostOutcome>>>>,
    sales_batches: Arc<RwLock<Vec<Vec<SaleRecord>>>>,
    registration_batches: Arc<RwLock<Vec<Vec<RegistrationRecord>>>>,
    /// Errors returned by the next `process_new_sales` calls.
    sales_errors: Arc<RwLock<VecDeque<PostingError>>>,
    /// Errors returned by the next `process_new_registrations` calls.
    registration_errors: Arc<RwLock<VecDeque<PostingError>>>,
    sales_delay: Arc<RwLock<Option<Duration>>>,
    refreshes: Arc<AtomicUsize>,
}

impl Default for MockPostingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPostingPipeline {
    /// Create a mock pipeline with every feature flag enabled.
    pub fn new() -> Self {
        Self {
            settings: Arc::new(RwLock::new(PostingSettings {
                enabled: true,
                registrations_enabled: true,
                min_sale_price: 0.0,
            })),
            sales_outcomes: Arc::new(RwLock::new(None)),
            registration_outcomes: Arc::new(RwLock::new(None)),
            sales_batches: Arc::new(RwLock::new(Vec::new())),
            registration_batches: Arc::new(RwLock::new(Vec::new())),
            sales_errors: Arc::new(RwLock::new(VecDeque::new())),
            registration_errors: Arc::new(RwLock::new(VecDeque::new())),
            sales_delay: Arc::new(RwLock::new(None)),
            refreshes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn set_settings(&self, settings: PostingSettings) {
        *self.settings.write().await = settings;
    }

    /// Outcomes returned for the next sales batches.
    pub async fn set_sales_outcomes(&self, outcomes: Vec<PostOutcome>) {
        *self.sales_outcomes.write().await = Some(outcomes);
    }

    /// Outcomes returned for the next registration batches.
    pub async fn set_registration_outcomes(&self, outcomes: Vec<PostOutcome>) {
        *self.registration_outcomes.write().await = Some(outcomes);
    }

    pub async fn fail_next_sales(&self, error: PostingError) {
        self.sales_errors.write().await.push_back(error);
    }

    pub async fn fail_next_registrations(&self, error: PostingError) {
        self.registration_errors.write().await.push_back(error);
    }

    /// Delay every sales batch by `delay`.
    pub async fn set_sales_delay(&self, delay: Option<Duration>) {
        *self.sales_delay.write().await = delay;
    }

    /// Sales batches received, in call order.
    pub async fn sales_batches(&self) -> Vec<Vec<SaleRecord>> {
        self.sales_batches.read().await.clone()
    }

    /// Registration batches received, in call order.
    pub async fn registration_batches(&self) -> Vec<Vec<RegistrationRecord>> {
        self.registration_batches.read().await.clone()
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PostingPipeline for MockPostingPipeline {
    async fn get_settings(&self) -> Result<PostingSettings, PostingError> {
        Ok(self.settings.read().await.clone())
    }

    async fn refresh_time_context(&self) -> Result<(), PostingError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn process_new_sales(
        &self,
        records: &[SaleRecord],
        _settings: &PostingSettings,
    ) -> Result<Vec<PostOutcome>, PostingError> {
        self.sales_batches.write().await.push(records.to_vec());

        let delay = *self.sales_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.sales_errors.write().await.pop_front() {
            return Err(error);
        }

        Ok(match *self.sales_outcomes.read().await {
            Some(ref outcomes) => outcomes.clone(),
            None => vec![PostOutcome::Posted; records.len()],
        })
    }

    async fn process_new_registrations(
        &self,
        records: &[RegistrationRecord],
        _settings: &PostingSettings,
    ) -> Result<Vec<PostOutcome>, PostingError> {
        self.registration_batches.write().await.push(records.to_vec());

        if let Some(error) = self.registration_errors.write().await.pop_front() {
            return Err(error);
        }

        Ok(match *self.registration_outcomes.read().await {
            Some(ref outcomes) => outcomes.clone(),
            None => vec![PostOutcome::Posted; records.len()],
        })
    }
}
