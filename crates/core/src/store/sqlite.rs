//! SQLite-backed state store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{StateStore, StoreError};
use crate::source::{RegistrationRecord, SaleRecord};

/// SQLite-backed state store.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sales (
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS registrations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                owner TEXT NOT NULL,
                cost REAL NOT NULL,
                currency TEXT NOT NULL,
                registered_at TEXT NOT NULL,
                published INTEGER NOT NULL DEFAULT 0,
                published_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_registrations_unpublished
                ON registrations(published, registered_at);
            "#,
        )
        .map_err(db_err)
    }

    fn row_to_registration(row: &rusqlite::Row) -> rusqlite::Result<RegistrationRecord> {
        let registered_at_str: String = row.get(5)?;
        let registered_at = DateTime::parse_from_rfc3339(&registered_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(RegistrationRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            owner: row.get(2)?,
            cost: row.get(3)?,
            currency: row.get(4)?,
            registered_at,
        })
    }
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl StateStore for SqliteStateStore {
    fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(db_err)
    }

    fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn get_unpublished_registrations(
        &self,
        limit: usize,
    ) -> Result<Vec<RegistrationRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, name, owner, cost, currency, registered_at
                FROM registrations
                WHERE published = 0
                ORDER BY registered_at ASC
                LIMIT ?1
                "#,
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![limit as i64], Self::row_to_registration)
            .map_err(db_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn record_sale(&self, sale: &SaleRecord) -> Result<bool, StoreError> {
        let payload =
            serde_json::to_string(sale).map_err(|e| StoreError::Database(e.to_string()))?;
        let conn = self.conn.lock().unwrap();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO sales (id, payload, recorded_at) VALUES (?1, ?2, ?3)",
                params![sale.id, payload, Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;
        Ok(inserted > 0)
    }

    fn insert_registration(&self, registration: &RegistrationRecord) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn
            .execute(
                r#"
                INSERT OR IGNORE INTO registrations
                    (id, name, owner, cost, currency, registered_at, published)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
                "#,
                params![
                    registration.id,
                    registration.name,
                    registration.owner,
                    registration.cost,
                    registration.currency,
                    registration.registered_at.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
        Ok(inserted > 0)
    }

    fn mark_registration_published(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE registrations SET published = 1, published_at = ?2 WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(())
    }
}
