//! Atomic unit-of-work execution over SQLite.

use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{StrataError, StrataResult};

/// SQL function that lowercases text with Unicode case mapping. SQLite's
/// built-in `lower()` only folds ASCII.
pub const FOLD_CASE_FUNCTION: &str = "strata_fold";

/// Runs units of work inside transactions.
///
/// Write units must be serialized against other writers of the same data
/// for their whole read-then-write span. Read units see one consistent
/// snapshot. Failures propagate unchanged; there is no retry here.
pub trait TransactionRunner: Send + Sync {
    /// Run a read-write unit. Commits on `Ok`, rolls back on `Err`.
    fn execute<T, F>(&self, unit: F) -> StrataResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StrataResult<T>;

    /// Run a read-only unit against a consistent snapshot.
    fn read<T, F>(&self, unit: F) -> StrataResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StrataResult<T>;
}

/// SQLite-backed runner. Write units take the database write lock up front
/// (`BEGIN IMMEDIATE`), so concurrent upserts of the same fact serialize
/// even across separate connections to the same file.
pub struct SqliteTransactionRunner {
    conn: Mutex<Connection>,
}

impl SqliteTransactionRunner {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> StrataResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.as_ref().display(), journal_mode = %mode, "opened store");
        Self::from_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> StrataResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    /// Wrap an open connection, registering the store's SQL functions on it.
    pub fn from_connection(conn: Connection) -> StrataResult<Self> {
        register_functions(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StrataResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StrataError::Internal("connection mutex poisoned".to_string()))
    }

    fn run<T, F>(&self, behavior: TransactionBehavior, unit: F) -> StrataResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StrataResult<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(behavior)?;
        let value = unit(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

fn register_functions(conn: &Connection) -> StrataResult<()> {
    conn.create_scalar_function(
        FOLD_CASE_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            Ok(match ctx.get_raw(0) {
                ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).to_lowercase()),
                _ => None,
            })
        },
    )?;
    Ok(())
}

impl TransactionRunner for SqliteTransactionRunner {
    fn execute<T, F>(&self, unit: F) -> StrataResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StrataResult<T>,
    {
        self.run(TransactionBehavior::Immediate, unit)
    }

    fn read<T, F>(&self, unit: F) -> StrataResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StrataResult<T>,
    {
        self.run(TransactionBehavior::Deferred, unit)
    }
}
