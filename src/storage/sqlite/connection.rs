//! Connection handling for the `SQLite` store.

use crate::{Error, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Busy timeout applied to every connection, in milliseconds.
pub const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Acquires a mutex, recovering the inner value if a previous holder panicked.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("store_lock_poison_recovery_total", "lock" => "sqlite_connection")
                .increment(1);
            poisoned.into_inner()
        },
    }
}

/// Applies WAL journaling, NORMAL synchronous mode and the busy timeout.
///
/// In-memory databases silently keep their `memory` journal mode.
///
/// # Errors
///
/// Returns [`Error::Store`] if the busy timeout cannot be set.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row, so its result is ignored rather than batched.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)
        .map_err(|e| Error::Store {
            operation: "configure_connection".to_string(),
            cause: e.to_string(),
        })
}
