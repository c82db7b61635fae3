//! Records and batch types produced by the upstream source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A completed sale observed upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    /// Upstream identifier, unique per sale.
    pub id: String,
    /// Name of the item that changed hands.
    pub item_name: String,
    /// Sale price in `currency` units.
    pub price: f64,
    pub currency: String,
    pub buyer: String,
    pub seller: String,
    pub sold_at: DateTime<Utc>,
    /// Link to the sale on the marketplace, if known.
    #[serde(default)]
    pub url: Option<String>,
}

/// A new registration observed upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    /// Upstream identifier, unique per registration.
    pub id: String,
    /// Registered name.
    pub name: String,
    pub owner: String,
    /// Registration cost in `currency` units.
    pub cost: f64,
    pub currency: String,
    pub registered_at: DateTime<Utc>,
}

/// Result of one fetch-and-dedup pass over the sales feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesBatch {
    /// Entries returned by the upstream feed.
    pub fetched: usize,
    /// Entries not seen before.
    pub new_count: usize,
    /// Entries already recorded by a previous pass.
    pub duplicate_count: usize,
    /// Entries that could not be parsed or stored.
    pub error_count: usize,
    /// The newly accepted records, in feed order.
    pub records: Vec<SaleRecord>,
}

impl SalesBatch {
    /// Whether the batch carries anything to post.
    pub fn has_new_records(&self) -> bool {
        self.new_count > 0 && !self.records.is_empty()
    }
}

/// Errors from a source fetch.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The upstream API could not be reached or answered with an error.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The upstream response could not be decoded.
    #[error("failed to parse source response: {0}")]
    Parse(String),

    /// Deduplication bookkeeping failed.
    #[error("source store error: {0}")]
    Store(String),

    /// Required settings (URLs, credentials) are absent.
    #[error("source configuration missing: {0}")]
    ConfigurationMissing(String),
}
