//! Persistent state: the orchestrator enabled flag plus record bookkeeping.

mod sqlite;

pub use sqlite::SqliteStateStore;

use thiserror::Error;

use crate::source::{RegistrationRecord, SaleRecord};

/// Key under which the orchestrator enabled flag is persisted.
pub const ORCHESTRATOR_ENABLED_KEY: &str = "orchestrator_enabled";

/// Errors from the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

/// Trait for state storage backends.
pub trait StateStore: Send + Sync {
    /// Read a value by key.
    fn get_value(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or replace a value.
    fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Registrations not yet confirmed as posted, oldest first.
    fn get_unpublished_registrations(
        &self,
        limit: usize,
    ) -> Result<Vec<RegistrationRecord>, StoreError>;

    /// Record a sale. Returns `true` if the sale id was not known before.
    fn record_sale(&self, sale: &SaleRecord) -> Result<bool, StoreError>;

    /// Store a registration as unpublished. Returns `true` if it is new.
    fn insert_registration(&self, registration: &RegistrationRecord) -> Result<bool, StoreError>;

    /// Mark a registration as posted so it is not returned again.
    fn mark_registration_published(&self, id: &str) -> Result<(), StoreError>;
}

/// Interpret a persisted enabled flag. Missing or unparseable means disabled.
pub fn parse_enabled_flag(value: Option<&str>) -> bool {
    value
        .and_then(|v| v.trim().parse::<bool>().ok())
        .unwrap_or(false)
}
