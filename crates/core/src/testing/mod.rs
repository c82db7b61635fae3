//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the orchestrator's
//! collaborator traits, so lifecycle tests run without a feed, a posting
//! platform or a database.
//!
//! # Example
//!
//! ```rust,ignore
//! use salebot_core::testing::{fixtures, MockPostingPipeline, MockSourceProcessor, MockStateStore};
//!
//! let source = MockSourceProcessor::new();
//! let pipeline = MockPostingPipeline::new();
//! let store = MockStateStore::new();
//!
//! // Configure mock responses
//! source.set_batch(fixtures::batch(vec![fixtures::sale("a", 1.0)])).await;
//! source.set_failing(Some("upstream down")).await;
//! ```

mod mock_pipeline;
mod mock_publisher;
mod mock_source;
mod mock_store;

pub use mock_pipeline::MockPostingPipeline;
pub use mock_publisher::MockPublisher;
pub use mock_source::MockSourceProcessor;
pub use mock_store::MockStateStore;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{TimeZone, Utc};

    use crate::source::{RegistrationRecord, SaleRecord, SalesBatch};

    /// Create a test sale with reasonable defaults.
    pub fn sale(id: &str, price: f64) -> SaleRecord {
        SaleRecord {
            id: id.to_string(),
            item_name: format!("item-{}", id),
            price,
            currency: "ETH".to_string(),
            buyer: "0x1111111111111111111111111111111111111111".to_string(),
            seller: "0x2222222222222222222222222222222222222222".to_string(),
            sold_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            url: Some(format!("https://market.example.com/sales/{}", id)),
        }
    }

    /// Create a test registration.
    pub fn registration(id: &str) -> RegistrationRecord {
        RegistrationRecord {
            id: id.to_string(),
            name: format!("{}.eth", id),
            owner: "0x3333333333333333333333333333333333333333".to_string(),
            cost: 0.01,
            currency: "ETH".to_string(),
            registered_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    /// A batch in which every record is new.
    pub fn batch(records: Vec<SaleRecord>) -> SalesBatch {
        SalesBatch {
            fetched: records.len(),
            new_count: records.len(),
            duplicate_count: 0,
            error_count: 0,
            records,
        }
    }
}
