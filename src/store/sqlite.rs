use super::pragma::apply_optimized_pragmas;
use super::{CounterRow, CounterStore, FlagOutcome, ScanFilter, StoreError};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS counters (
    namespace   TEXT    NOT NULL,
    key         TEXT    NOT NULL,
    total       INTEGER NOT NULL DEFAULT 0,
    flagged     INTEGER NOT NULL DEFAULT 0,
    flagged_at  INTEGER,
    updated_at  INTEGER NOT NULL,
    PRIMARY KEY (namespace, key)
);
CREATE INDEX IF NOT EXISTS idx_counters_flagged ON counters(namespace, flagged);
"#;

/// Upsert-increment. `total` on the right-hand side is the stored value, so
/// the add happens inside the single statement and cannot lose updates.
/// `flagged` is only written on insert.
const UPSERT_INCREMENT: &str = r#"
INSERT INTO counters (namespace, key, total, flagged, updated_at)
VALUES (?1, ?2, ?3, 0, ?4)
ON CONFLICT(namespace, key) DO UPDATE SET
    total = total + excluded.total,
    updated_at = excluded.updated_at
RETURNING key, total, flagged
"#;

const SET_FLAG: &str = r#"
UPDATE counters SET flagged = 1, flagged_at = ?3, updated_at = ?3
WHERE namespace = ?1 AND key = ?2 AND flagged = 0
"#;

/// SQLite-backed counter store.
///
/// Thread-safe connection wrapper; clones share the same connection. Other
/// processes may open the same file: every mutation is a single statement or
/// an IMMEDIATE transaction, and the busy timeout serializes writers.
#[derive(Debug)]
pub struct SqliteCounterStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCounterStore {
    /// Open (or create) the store at `db_path`, creating parent directories
    /// and the schema as needed.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Database(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        apply_optimized_pragmas(&conn)?;
        conn.execute_batch(SCHEMA)?;

        log::info!("✅ Counter store ready at {}", db_path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn upsert_increment(
        conn: &Connection,
        namespace: &str,
        key: &str,
        delta: i64,
        now: i64,
    ) -> Result<CounterRow, StoreError> {
        let row = conn.query_row(UPSERT_INCREMENT, params![namespace, key, delta, now], |row| {
            Ok(CounterRow {
                key: row.get(0)?,
                count: row.get(1)?,
                flag: row.get(2)?,
            })
        })?;
        Ok(row)
    }

    fn mark_flag(conn: &Connection, namespace: &str, key: &str, now: i64) -> Result<bool, StoreError> {
        let changed = conn.execute(SET_FLAG, params![namespace, key, now])?;
        Ok(changed == 1)
    }
}

impl Clone for SqliteCounterStore {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

#[async_trait]
impl CounterStore for SqliteCounterStore {
    async fn increment(&self, namespace: &str, key: &str, delta: i64) -> Result<CounterRow, StoreError> {
        let conn = self.lock()?;
        Self::upsert_increment(&conn, namespace, key, delta, chrono::Utc::now().timestamp())
    }

    async fn set_flag(&self, namespace: &str, key: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        Self::mark_flag(&conn, namespace, key, chrono::Utc::now().timestamp())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<CounterRow>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT key, total, flagged FROM counters WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| {
                    Ok(CounterRow {
                        key: row.get(0)?,
                        count: row.get(1)?,
                        flag: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    async fn scan(&self, namespace: &str, filter: ScanFilter) -> Result<Vec<CounterRow>, StoreError> {
        let conn = self.lock()?;
        let sql = match filter {
            ScanFilter::All => {
                "SELECT key, total, flagged FROM counters WHERE namespace = ?1 ORDER BY key"
            }
            ScanFilter::Flagged => {
                "SELECT key, total, flagged FROM counters WHERE namespace = ?1 AND flagged = 1 ORDER BY key"
            }
        };

        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params![namespace], |row| {
                Ok(CounterRow {
                    key: row.get(0)?,
                    count: row.get(1)?,
                    flag: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Increment and threshold check in one IMMEDIATE transaction, so the
    /// flag is set by exactly the caller whose increment crossed the threshold.
    async fn increment_and_flag_above(
        &self,
        namespace: &str,
        key: &str,
        delta: i64,
        threshold: i64,
    ) -> Result<FlagOutcome, StoreError> {
        let mut conn = self.lock()?;
        let now = chrono::Utc::now().timestamp();

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut row = Self::upsert_increment(&tx, namespace, key, delta, now)?;

        let mut newly_flagged = false;
        if row.count > threshold && !row.flag {
            newly_flagged = Self::mark_flag(&tx, namespace, key, now)?;
            row.flag = true;
        }
        tx.commit()?;

        Ok(FlagOutcome { row, newly_flagged })
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
