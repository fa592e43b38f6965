//! Global surrogate id sequence.
//!
//! One counter shared by every schema table in a database, advanced inside
//! the caller's write transaction so an id is never handed out twice.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StrataResult;

const SEQUENCE_NAME: &str = "cid";

pub(crate) fn ensure_sequence(conn: &Connection) -> StrataResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS strata_sequence (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// Next cid; the first one handed out is 1.
pub(crate) fn next_cid(conn: &Connection) -> StrataResult<i64> {
    let current: i64 = conn
        .query_row(
            "SELECT value FROM strata_sequence WHERE name = ?1",
            params![SEQUENCE_NAME],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    let next = current + 1;
    conn.execute(
        r#"
        INSERT INTO strata_sequence (name, value) VALUES (?1, ?2)
        ON CONFLICT(name) DO UPDATE SET value = excluded.value
        "#,
        params![SEQUENCE_NAME, next],
    )?;
    Ok(next)
}
