//! Quota-gated posting pipeline.
//!
//! Renders records into drafts, skips anything already posted by this process
//! or below the configured price floor, enforces the rolling quota and hands
//! the rest to a [`Publisher`].

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    OutcomeTally, PostDraft, PostOutcome, PostingError, PostingPipeline, PostingSettings,
    Publisher, QuotaConfig, QuotaHandle, QuotaStatus, SettingsHandle,
};
use crate::source::{RegistrationRecord, SaleRecord};
use crate::store::StateStore;

/// How many posted ids are remembered for local dedup.
const RECENT_POSTS_CAPACITY: usize = 10_000;

/// Bounded set of recently posted keys, oldest evicted first.
struct RecentPosts {
    keys: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl RecentPosts {
    fn new(capacity: usize) -> Self {
        Self {
            keys: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn insert(&mut self, key: String) {
        if !self.keys.insert(key.clone()) {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.keys.remove(&evicted);
            }
        }
    }
}

/// Posting pipeline that respects the platform quota.
pub struct QuotaPostingPipeline<P: Publisher> {
    publisher: P,
    settings: SettingsHandle,
    quota: QuotaHandle,
    recent: Mutex<RecentPosts>,
    store: Option<Arc<dyn StateStore>>,
}

impl<P: Publisher> QuotaPostingPipeline<P> {
    pub fn new(publisher: P, settings: SettingsHandle, quota: &QuotaConfig) -> Self {
        Self {
            publisher,
            settings,
            quota: QuotaHandle::new(quota),
            recent: Mutex::new(RecentPosts::new(RECENT_POSTS_CAPACITY)),
            store: None,
        }
    }

    /// Mark registrations as published in this store once posted.
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Shared view of the quota window this pipeline consumes.
    pub fn quota_handle(&self) -> QuotaHandle {
        self.quota.clone()
    }

    pub async fn quota_status(&self) -> QuotaStatus {
        self.quota.status().await
    }

    /// Post one draft, converting every per-record failure into an outcome.
    ///
    /// Only a configuration problem is returned as an error: it affects every
    /// remaining record, so the batch is abandoned.
    async fn post_one(&self, key: String, draft: PostDraft) -> Result<PostOutcome, PostingError> {
        if self.recent.lock().await.contains(&key) {
            return Ok(PostOutcome::skipped("already posted"));
        }

        let slot = match self.quota.try_acquire().await {
            Ok(slot) => slot,
            Err(wait) => {
                return Ok(PostOutcome::failed(format!(
                    "quota exceeded, next slot in {}s",
                    wait.as_secs()
                )));
            }
        };

        match self.publisher.publish(&draft).await {
            Ok(()) => {
                self.recent.lock().await.insert(key);
                Ok(PostOutcome::Posted)
            }
            Err(e) => {
                self.quota.refund(slot).await;
                match e {
                    PostingError::ConfigurationMissing(_) => Err(e),
                    other => {
                        warn!(
                            publisher = self.publisher.name(),
                            record_id = %draft.record_id,
                            error = %other,
                            "Failed to publish post"
                        );
                        Ok(PostOutcome::failed(other.to_string()))
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<P: Publisher> PostingPipeline for QuotaPostingPipeline<P> {
    async fn get_settings(&self) -> Result<PostingSettings, PostingError> {
        Ok(self.settings.get().await)
    }

    async fn refresh_time_context(&self) -> Result<(), PostingError> {
        self.publisher.refresh_clock().await
    }

    async fn process_new_sales(
        &self,
        records: &[SaleRecord],
        settings: &PostingSettings,
    ) -> Result<Vec<PostOutcome>, PostingError> {
        let mut outcomes = Vec::with_capacity(records.len());

        for sale in records {
            if sale.price < settings.min_sale_price {
                debug!(sale_id = %sale.id, price = sale.price, "Sale below minimum price");
                outcomes.push(PostOutcome::skipped("below minimum price"));
                continue;
            }
            let outcome = self
                .post_one(format!("sale:{}", sale.id), sale_draft(sale))
                .await?;
            outcomes.push(outcome);
        }

        let tally = OutcomeTally::from_outcomes(&outcomes);
        info!(
            posted = tally.posted,
            skipped = tally.skipped,
            failed = tally.failed,
            "Processed sales batch"
        );
        Ok(outcomes)
    }

    async fn process_new_registrations(
        &self,
        records: &[RegistrationRecord],
        _settings: &PostingSettings,
    ) -> Result<Vec<PostOutcome>, PostingError> {
        let mut outcomes = Vec::with_capacity(records.len());

        for registration in records {
            let outcome = self
                .post_one(
                    format!("registration:{}", registration.id),
                    registration_draft(registration),
                )
                .await?;

            // Already-posted records are marked too so they stop coming back.
            if matches!(outcome, PostOutcome::Posted | PostOutcome::Skipped { .. }) {
                if let Some(ref store) = self.store {
                    if let Err(e) = store.mark_registration_published(&registration.id) {
                        warn!(
                            registration_id = %registration.id,
                            error = %e,
                            "Failed to mark registration as published"
                        );
                    }
                }
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}

/// Shorten `0x`-prefixed addresses to `0x1234…abcd`.
fn short_address(address: &str) -> String {
    if address.is_ascii() && address.starts_with("0x") && address.len() > 12 {
        format!("{}…{}", &address[..6], &address[address.len() - 4..])
    } else {
        address.to_string()
    }
}

fn sale_draft(sale: &SaleRecord) -> PostDraft {
    PostDraft {
        kind: "sale".to_string(),
        record_id: sale.id.clone(),
        text: format!(
            "{} sold for {} {} ({} → {})",
            sale.item_name,
            sale.price,
            sale.currency,
            short_address(&sale.seller),
            short_address(&sale.buyer)
        ),
        link: sale.url.clone(),
    }
}

fn registration_draft(registration: &RegistrationRecord) -> PostDraft {
    PostDraft {
        kind: "registration".to_string(),
        record_id: registration.id.clone(),
        text: format!(
            "{} registered by {} for {} {}",
            registration.name,
            short_address(&registration.owner),
            registration.cost,
            registration.currency
        ),
        link: None,
    }
}
