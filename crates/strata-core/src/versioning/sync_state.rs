//! Non-versioned per-owner sync state.
//!
//! Unlike schema tables, this keeps exactly one forever-open row per owner
//! and overwrites it in place. It records bookkeeping such as remote cursors
//! between resynchronizations, where history has no value.

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::store::validate_as_of;
use crate::error::{StrataError, StrataResult};
use crate::storage::sequence::{ensure_sequence, next_cid};
use crate::storage::TransactionRunner;
use crate::types::{is_identifier, FOREVER};

/// Default table for sync state.
pub const DEFAULT_SYNC_TABLE: &str = "sync_state";

/// Stored sync state for one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub cid: i64,
    pub owner: String,
    /// When the row was first written.
    pub life_start: i64,
    pub life_end: i64,
    /// When the state was last overwritten.
    pub updated_at: i64,
    pub state: serde_json::Value,
}

/// Singleton row store keyed by owner.
pub struct SyncStateStore<R: TransactionRunner> {
    runner: Arc<R>,
    table: String,
}

impl<R: TransactionRunner> SyncStateStore<R> {
    /// Open the store on the default table.
    pub fn new(runner: Arc<R>) -> StrataResult<Self> {
        Self::with_table(runner, DEFAULT_SYNC_TABLE)
    }

    /// Open the store on a named table, creating it if missing.
    pub fn with_table(runner: Arc<R>, table: impl Into<String>) -> StrataResult<Self> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(StrataError::invalid_schema(format!(
                "invalid sync state table name '{}'",
                table
            )));
        }
        runner.execute(|tx| {
            ensure_sequence(tx)?;
            create(tx, &table)
        })?;
        Ok(Self { runner, table })
    }

    /// Insert or overwrite an owner's state as of `as_of`.
    pub fn put<S: Serialize>(&self, owner: &str, state: &S, as_of: i64) -> StrataResult<SyncState> {
        if owner.trim().is_empty() {
            return Err(StrataError::validation("owner id must not be blank"));
        }
        validate_as_of(as_of)?;
        let state = serde_json::to_value(state)?;
        let json = serde_json::to_string(&state)?;

        self.runner.execute(|tx| match fetch(tx, &self.table, owner)? {
            Some(current) => {
                if as_of < current.updated_at {
                    warn!(table = %self.table, owner, as_of, updated_at = current.updated_at, "rejected stale sync state");
                    return Err(StrataError::retroactive(&self.table, as_of, current.updated_at));
                }
                tx.execute(
                    &format!(
                        "UPDATE \"{}\" SET state = ?1, updated_at = ?2 WHERE cid = ?3",
                        self.table
                    ),
                    rusqlite::params![json, as_of, current.cid],
                )?;
                debug!(table = %self.table, owner, cid = current.cid, "sync state updated");
                Ok(SyncState {
                    updated_at: as_of,
                    state,
                    ..current
                })
            }
            None => {
                let cid = next_cid(tx)?;
                tx.execute(
                    &format!(
                        "INSERT INTO \"{}\" (cid, owner, life_start, life_end, updated_at, state)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        self.table
                    ),
                    rusqlite::params![cid, owner, as_of, FOREVER, as_of, json],
                )?;
                debug!(table = %self.table, owner, cid, "sync state created");
                Ok(SyncState {
                    cid,
                    owner: owner.to_string(),
                    life_start: as_of,
                    life_end: FOREVER,
                    updated_at: as_of,
                    state,
                })
            }
        })
    }

    /// An owner's state, if any was stored.
    pub fn get(&self, owner: &str) -> StrataResult<Option<SyncState>> {
        self.runner.read(|tx| fetch(tx, &self.table, owner))
    }

    /// An owner's state decoded into `T`.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, owner: &str) -> StrataResult<Option<T>> {
        match self.get(owner)? {
            Some(row) => Ok(Some(serde_json::from_value(row.state)?)),
            None => Ok(None),
        }
    }
}

fn create(conn: &Connection, table: &str) -> StrataResult<()> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
            cid INTEGER PRIMARY KEY,
            owner TEXT NOT NULL UNIQUE,
            life_start INTEGER NOT NULL,
            life_end INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            state TEXT NOT NULL
        );
        "#
    ))?;
    Ok(())
}

fn fetch(conn: &Connection, table: &str, owner: &str) -> StrataResult<Option<SyncState>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT cid, owner, life_start, life_end, updated_at, state FROM \"{}\" WHERE owner = ?1",
                table
            ),
            [owner],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((cid, owner, life_start, life_end, updated_at, json)) => Ok(Some(SyncState {
            cid,
            owner,
            life_start,
            life_end,
            updated_at,
            state: serde_json::from_str(&json)?,
        })),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::storage::SqliteTransactionRunner;
    use serde_json::json;

    fn store() -> SyncStateStore<SqliteTransactionRunner> {
        let runner = Arc::new(SqliteTransactionRunner::in_memory().unwrap());
        SyncStateStore::new(runner).unwrap()
    }

    #[test]
    fn test_put_then_overwrite_keeps_identity() {
        let store = store();
        let first = store.put("user-1", &json!({"cursor": "a"}), 100).unwrap();
        let second = store.put("user-1", &json!({"cursor": "b"}), 200).unwrap();

        assert_eq!(first.cid, second.cid);
        assert_eq!(second.life_start, 100);
        assert_eq!(second.life_end, FOREVER);
        assert_eq!(second.updated_at, 200);

        let stored = store.get("user-1").unwrap().unwrap();
        assert_eq!(stored, second);
        assert_eq!(stored.state, json!({"cursor": "b"}));
    }

    #[test]
    fn test_owners_are_independent() {
        let store = store();
        store.put("user-1", &json!(1), 10).unwrap();
        assert!(store.get("user-2").unwrap().is_none());
        assert_eq!(store.get_as::<i64>("user-1").unwrap(), Some(1));
    }

    #[test]
    fn test_stale_put_rejected() {
        let store = store();
        store.put("user-1", &json!({"cursor": "b"}), 200).unwrap();
        let err = store.put("user-1", &json!({"cursor": "a"}), 100).unwrap_err();
        assert_eq!(err.code(), ErrorCode::VerRetroactiveWrite);

        let err = store.put("user-1", &json!({"cursor": "c"}), FOREVER).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValInvalidInput);
        assert_eq!(store.get("user-1").unwrap().unwrap().state, json!({"cursor": "b"}));
    }

    #[test]
    fn test_invalid_table_name() {
        let runner = Arc::new(SqliteTransactionRunner::in_memory().unwrap());
        assert!(SyncStateStore::with_table(runner, "bad name; --").is_err());
    }
}
