//! JSON feed source backed by reqwest.
//!
//! The sales feed is expected to return a JSON array of objects with the
//! [`SaleRecord`] fields. Entries that fail to decode are counted as errors
//! and skipped instead of failing the whole pass.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{RegistrationRecord, SaleRecord, SalesBatch, SourceError, SourceProcessor};
use crate::store::StateStore;

/// Upstream feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// URL returning recent sales as a JSON array.
    pub sales_url: String,
    /// URL returning recent registrations as a JSON array.
    #[serde(default)]
    pub registrations_url: Option<String>,
    /// Optional bearer token sent with every request.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

/// Source that polls HTTP JSON feeds and dedups against the state store.
pub struct HttpFeedSource {
    config: FeedConfig,
    client: Client,
    store: Arc<dyn StateStore>,
}

impl HttpFeedSource {
    /// Create a new feed source.
    pub fn new(config: FeedConfig, store: Arc<dyn StateStore>) -> Result<Self, SourceError> {
        if config.sales_url.trim().is_empty() {
            return Err(SourceError::ConfigurationMissing(
                "feed.sales_url is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        Ok(Self {
            config,
            client,
            store,
        })
    }

    async fn fetch_entries(&self, url: &str) -> Result<Vec<serde_json::Value>, SourceError> {
        let mut request = self.client.get(url);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))
    }

    /// Pull the registration feed into the store as unpublished records.
    async fn ingest_registrations(&self, url: &str) -> Result<usize, SourceError> {
        let entries = self.fetch_entries(url).await?;
        let mut inserted = 0;

        for entry in entries {
            match serde_json::from_value::<RegistrationRecord>(entry) {
                Ok(registration) => {
                    if self
                        .store
                        .insert_registration(&registration)
                        .map_err(|e| SourceError::Store(e.to_string()))?
                    {
                        inserted += 1;
                    }
                }
                Err(e) => warn!(error = %e, "Skipping malformed registration entry"),
            }
        }

        Ok(inserted)
    }
}

/// Dedup decoded feed entries against the store.
fn dedup_sales(entries: Vec<serde_json::Value>, store: &dyn StateStore) -> SalesBatch {
    let mut batch = SalesBatch {
        fetched: entries.len(),
        ..Default::default()
    };

    for entry in entries {
        let sale = match serde_json::from_value::<SaleRecord>(entry) {
            Ok(sale) => sale,
            Err(e) => {
                debug!(error = %e, "Malformed sale entry");
                batch.error_count += 1;
                continue;
            }
        };

        match store.record_sale(&sale) {
            Ok(true) => {
                batch.new_count += 1;
                batch.records.push(sale);
            }
            Ok(false) => batch.duplicate_count += 1,
            Err(e) => {
                warn!(sale_id = %sale.id, error = %e, "Failed to record sale");
                batch.error_count += 1;
            }
        }
    }

    batch
}

#[async_trait]
impl SourceProcessor for HttpFeedSource {
    async fn process_new_sales(&self) -> Result<SalesBatch, SourceError> {
        let entries = self.fetch_entries(&self.config.sales_url).await?;
        let batch = dedup_sales(entries, self.store.as_ref());

        if let Some(ref url) = self.config.registrations_url {
            match self.ingest_registrations(url).await {
                Ok(0) => {}
                Ok(n) => info!(count = n, "Ingested new registrations"),
                // Registration ingestion never fails the sales pass.
                Err(e) => warn!(error = %e, "Registration feed ingestion failed"),
            }
        }

        Ok(batch)
    }
}
