//! Shared atomic counter store
//!
//! The only cross-invocation mutable state in the pipeline lives here: one
//! namespace per logical table (`ban_table`, `sentiment_table`), each row an
//! integer counter plus a one-way boolean flag, keyed by an arbitrary string.
//!
//! Guarantees every backend must provide:
//! - `increment` never loses updates under concurrent callers on the same key
//!   (a plain read-modify-write is not an implementation)
//! - `increment` initializes the flag to `false` only when it creates the row
//! - `set_flag` only transitions `false -> true`; it never clears a flag

pub mod pragma;
pub mod sqlite;

pub use sqlite::SqliteCounterStore;

use async_trait::async_trait;

#[derive(Debug)]
pub enum StoreError {
    Database(String),
    Poisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Counter store error: {}", e),
            StoreError::Poisoned => write!(f, "Counter store connection lock poisoned"),
        }
    }
}

impl std::error::Error for StoreError {}

/// One counter row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRow {
    pub key: String,
    pub count: i64,
    pub flag: bool,
}

/// Row filter for [`CounterStore::scan`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFilter {
    All,
    Flagged,
}

impl ScanFilter {
    pub fn matches(&self, row: &CounterRow) -> bool {
        match self {
            ScanFilter::All => true,
            ScanFilter::Flagged => row.flag,
        }
    }
}

/// Result of [`CounterStore::increment_and_flag_above`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagOutcome {
    /// Row state after the increment (and flag, if set)
    pub row: CounterRow,
    /// True only for the call that moved the flag from false to true
    pub newly_flagged: bool,
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add `delta` to the counter, creating the row (flag = false)
    /// if absent. Returns the post-increment row.
    async fn increment(&self, namespace: &str, key: &str, delta: i64) -> Result<CounterRow, StoreError>;

    /// Set the flag only if it is not already set. Returns true if this call set it.
    async fn set_flag(&self, namespace: &str, key: &str) -> Result<bool, StoreError>;

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<CounterRow>, StoreError>;

    /// Full scan of a namespace, ordered by key.
    async fn scan(&self, namespace: &str, filter: ScanFilter) -> Result<Vec<CounterRow>, StoreError>;

    /// Increment, then set the flag if the new count exceeds `threshold`.
    ///
    /// This default composes the primitives as increment, read, conditional
    /// set. Two concurrent callers may both observe the count above the
    /// threshold and both call `set_flag`; only one reports `newly_flagged`
    /// and the flag ends up `true` either way. Backends with transactions
    /// override this to run the whole sequence atomically.
    async fn increment_and_flag_above(
        &self,
        namespace: &str,
        key: &str,
        delta: i64,
        threshold: i64,
    ) -> Result<FlagOutcome, StoreError> {
        let row = self.increment(namespace, key, delta).await?;
        if row.count > threshold && !row.flag {
            let newly_flagged = self.set_flag(namespace, key).await?;
            return Ok(FlagOutcome {
                row: CounterRow { flag: true, ..row },
                newly_flagged,
            });
        }
        Ok(FlagOutcome { row, newly_flagged: false })
    }

    /// Backend name for logging
    fn backend_type(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Primitive-only backend, so the composed default is what runs.
    #[derive(Default)]
    struct MapStore {
        rows: Mutex<HashMap<(String, String), (i64, bool)>>,
    }

    #[async_trait]
    impl CounterStore for MapStore {
        async fn increment(&self, namespace: &str, key: &str, delta: i64) -> Result<CounterRow, StoreError> {
            let mut rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
            let entry = rows
                .entry((namespace.to_string(), key.to_string()))
                .or_insert((0, false));
            entry.0 += delta;
            Ok(CounterRow { key: key.to_string(), count: entry.0, flag: entry.1 })
        }

        async fn set_flag(&self, namespace: &str, key: &str) -> Result<bool, StoreError> {
            let mut rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
            match rows.get_mut(&(namespace.to_string(), key.to_string())) {
                Some(entry) if !entry.1 => {
                    entry.1 = true;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn get(&self, namespace: &str, key: &str) -> Result<Option<CounterRow>, StoreError> {
            let rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
            Ok(rows
                .get(&(namespace.to_string(), key.to_string()))
                .map(|&(count, flag)| CounterRow { key: key.to_string(), count, flag }))
        }

        async fn scan(&self, namespace: &str, filter: ScanFilter) -> Result<Vec<CounterRow>, StoreError> {
            let rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
            let mut out: Vec<_> = rows
                .iter()
                .filter(|((ns, _), _)| ns == namespace)
                .map(|((_, key), &(count, flag))| CounterRow { key: key.clone(), count, flag })
                .filter(|row| filter.matches(row))
                .collect();
            out.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(out)
        }

        fn backend_type(&self) -> &'static str {
            "map"
        }
    }

    #[tokio::test]
    async fn test_default_flag_above_threshold() {
        let store = MapStore::default();

        for _ in 0..3 {
            let outcome = store.increment_and_flag_above("ban", "U1", 1, 3).await.unwrap();
            assert!(!outcome.row.flag);
        }

        let outcome = store.increment_and_flag_above("ban", "U1", 1, 3).await.unwrap();
        assert_eq!(outcome.row.count, 4);
        assert!(outcome.row.flag);
        assert!(outcome.newly_flagged);

        let outcome = store.increment_and_flag_above("ban", "U1", 1, 3).await.unwrap();
        assert!(outcome.row.flag);
        assert!(!outcome.newly_flagged);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_default_concurrent_flag_set_once() {
        let store: Arc<dyn CounterStore> = Arc::new(MapStore::default());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store.increment_and_flag_above("ban", "U1", 1, 3).await.unwrap()
                })
            })
            .collect();

        let mut newly = 0;
        for handle in handles {
            if handle.await.unwrap().newly_flagged {
                newly += 1;
            }
        }

        let row = store.get("ban", "U1").await.unwrap().unwrap();
        assert_eq!(row.count, 16);
        assert!(row.flag);
        assert_eq!(newly, 1);
    }

    #[test]
    fn test_scan_filter_matches() {
        let row = CounterRow { key: "k".into(), count: 1, flag: false };
        assert!(ScanFilter::All.matches(&row));
        assert!(!ScanFilter::Flagged.matches(&row));
    }
}
