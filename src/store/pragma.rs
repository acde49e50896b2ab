//! SQLite connection tuning for the counter store.

use rusqlite::Connection;
use std::time::Duration;

/// How long a writer waits on a lock held by another connection or process
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// WAL journal, NORMAL sync, in-memory temp store, 1000-page autocheckpoint.
///
/// Returns the journal mode SQLite actually selected (`memory` for in-memory
/// databases, `wal` for files).
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<String> {
    conn.busy_timeout(BUSY_TIMEOUT)?;

    let journal_mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000)?;

    log::debug!("SQLite journal_mode={}", journal_mode);
    Ok(journal_mode)
}
