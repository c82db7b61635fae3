//! Upstream record source.
//!
//! The orchestrator only sees the [`SourceProcessor`] trait; [`HttpFeedSource`]
//! is the JSON-feed implementation used by the server.

mod http_feed;
mod types;

pub use http_feed::{FeedConfig, HttpFeedSource};
pub use types::{RegistrationRecord, SaleRecord, SalesBatch, SourceError};

use async_trait::async_trait;

/// Fetches and deduplicates new sale records.
#[async_trait]
pub trait SourceProcessor: Send + Sync {
    /// Fetch the upstream feed and return only the records not seen before.
    async fn process_new_sales(&self) -> Result<SalesBatch, SourceError>;
}
