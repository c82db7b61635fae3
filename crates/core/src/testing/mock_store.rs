//! Mock state store for testing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::source::{RegistrationRecord, SaleRecord};
use crate::store::{StateStore, StoreError};

#[derive(Debug, Default)]
struct StoreData {
    values: HashMap<String, String>,
    sales: HashSet<String>,
    /// Registrations in insertion order with their published flag.
    registrations: Vec<(RegistrationRecord, bool)>,
}

/// In-memory implementation of the StateStore trait.
///
/// Reads and writes can be made to fail independently, and writes are
/// counted so tests can assert on persistence.
#[derive(Debug, Clone, Default)]
pub struct MockStateStore {
    data: Arc<Mutex<StoreData>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl MockStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with one value preset.
    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::new();
        store
            .data
            .lock()
            .unwrap()
            .values
            .insert(key.to_string(), value.to_string());
        store
    }

    /// Read a value without going through the failure switches.
    pub fn value(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap().values.get(key).cloned()
    }

    /// Add an unpublished registration.
    pub fn add_registration(&self, record: RegistrationRecord) {
        self.data
            .lock()
            .unwrap()
            .registrations
            .push((record, false));
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `set_value` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database("simulated read failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("simulated write failure".to_string()));
        }
        Ok(())
    }
}

impl StateStore for MockStateStore {
    fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_read()?;
        Ok(self.value(key))
    }

    fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.data
            .lock()
            .unwrap()
            .values
            .insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_unpublished_registrations(
        &self,
        limit: usize,
    ) -> Result<Vec<RegistrationRecord>, StoreError> {
        self.check_read()?;
        Ok(self
            .data
            .lock()
            .unwrap()
            .registrations
            .iter()
            .filter(|(_, published)| !published)
            .take(limit)
            .map(|(record, _)| record.clone())
            .collect())
    }

    fn record_sale(&self, sale: &SaleRecord) -> Result<bool, StoreError> {
        self.check_write()?;
        Ok(self.data.lock().unwrap().sales.insert(sale.id.clone()))
    }

    fn insert_registration(&self, record: &RegistrationRecord) -> Result<bool, StoreError> {
        self.check_write()?;
        let mut data = self.data.lock().unwrap();
        if data.registrations.iter().any(|(r, _)| r.id == record.id) {
            return Ok(false);
        }
        data.registrations.push((record.clone(), false));
        Ok(true)
    }

    fn mark_registration_published(&self, id: &str) -> Result<(), StoreError> {
        self.check_write()?;
        let mut data = self.data.lock().unwrap();
        for (record, published) in data.registrations.iter_mut() {
            if record.id == id {
                *published = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_failure_switches() {
        let store = MockStateStore::with_value("k", "v");
        assert_eq!(store.get_value("k").unwrap().as_deref(), Some("v"));

        store.set_fail_reads(true);
        assert!(store.get_value("k").is_err());

        store.set_fail_writes(true);
        assert!(store.set_value("k", "w").is_err());
        assert_eq!(store.write_count(), 0);
        assert_eq!(store.value("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_unpublished_registrations_respect_limit() {
        let store = MockStateStore::new();
        for id in ["r1", "r2", "r3"] {
            store.add_registration(fixtures::registration(id));
        }
        store.mark_registration_published("r1").unwrap();

        let pending = store.get_unpublished_registrations(1).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "r2");
    }
}
