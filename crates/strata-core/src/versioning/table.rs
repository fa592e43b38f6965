//! Generic row store for one schema descriptor.
//!
//! Every versioned schema shares this repository; the descriptor supplies
//! the table name and typed columns. Methods take a `&Connection` so they
//! compose inside whatever transaction the caller holds.

use rusqlite::{Connection, Row};
use std::sync::Arc;

use crate::error::{StrataError, StrataResult};
use crate::query::{select_list, Column, CompareOp, ExecutablePage, Predicate, TABLE_ALIAS};
use crate::selector::{AttributeParameters, Direction};
use crate::types::{FieldType, FieldValue, Fields, SchemaDescriptor, VersionedRecord, FOREVER};

/// Row store for one schema.
#[derive(Debug, Clone)]
pub struct SchemaTable {
    schema: Arc<SchemaDescriptor>,
}

impl SchemaTable {
    pub fn new(schema: SchemaDescriptor) -> StrataResult<Self> {
        schema.validate()?;
        Ok(Self {
            schema: Arc::new(schema),
        })
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    /// Create the table and its indexes if missing.
    pub fn create(&self, conn: &Connection) -> StrataResult<()> {
        let name = &self.schema.name;
        let mut columns = vec![
            "cid INTEGER PRIMARY KEY".to_string(),
            "owner TEXT".to_string(),
        ];
        for def in &self.schema.key {
            columns.push(format!("\"{}\" {} NOT NULL", def.name, def.field_type.column_type()));
        }
        for def in &self.schema.fields {
            columns.push(format!("\"{}\" {}", def.name, def.field_type.column_type()));
        }
        columns.push("life_start INTEGER NOT NULL".to_string());
        columns.push("life_end INTEGER NOT NULL".to_string());
        columns.push("CHECK (life_start < life_end)".to_string());

        let key_columns: Vec<String> = self
            .schema
            .key
            .iter()
            .map(|def| format!("\"{}\"", def.name))
            .collect();
        let key_columns = key_columns.join(", ");

        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{name}" (
                {columns}
            );

            -- Point lookups by natural key and validity interval
            CREATE INDEX IF NOT EXISTS "ix_{name}_key_life"
                ON "{name}"(owner, {key_columns}, life_start, life_end);

            -- At most one live version per fact
            CREATE UNIQUE INDEX IF NOT EXISTS "ux_{name}_live"
                ON "{name}"(ifnull(owner, ''), {key_columns})
                WHERE life_end = {forever};
            "#,
            columns = columns.join(",\n                "),
            forever = FOREVER,
        ))?;
        Ok(())
    }

    /// Predicate matching one fact: owner plus every key column.
    pub fn fact_predicate(&self, owner: Option<&str>, key: &Fields) -> Predicate {
        let mut parts = vec![owner_predicate(owner)];
        for def in &self.schema.key {
            let value = key.get(&def.name).cloned().unwrap_or(FieldValue::Null);
            parts.push(Predicate::Compare {
                column: Column::Field(def.name.clone()),
                op: CompareOp::Eq,
                value,
            });
        }
        Predicate::all(parts)
    }

    /// Rows matching `predicate`, ordered by cid.
    pub fn select(
        &self,
        conn: &Connection,
        predicate: &Predicate,
        direction: Direction,
        limit: Option<u32>,
    ) -> StrataResult<Vec<VersionedRecord>> {
        let mut params = AttributeParameters::new();
        let filter = predicate.render(&mut params)?;
        let order = match direction {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        };
        let limit_clause = match limit {
            Some(n) => format!(" LIMIT {}", params.bind_i64(i64::from(n))),
            None => String::new(),
        };
        let sql = format!(
            "SELECT {} FROM \"{}\" AS {} WHERE {} ORDER BY {}.cid {}{}",
            select_list(&self.schema),
            self.schema.name,
            TABLE_ALIAS,
            filter,
            TABLE_ALIAS,
            order,
            limit_clause
        );
        self.query(conn, &sql, &params)
    }

    /// Run a compiled page query.
    pub fn fetch_page(&self, conn: &Connection, page: &ExecutablePage) -> StrataResult<Vec<VersionedRecord>> {
        self.query(conn, &page.sql, &page.params)
    }

    /// Most recent version of one fact, live or closed.
    pub fn latest(
        &self,
        conn: &Connection,
        owner: Option<&str>,
        key: &Fields,
    ) -> StrataResult<Option<VersionedRecord>> {
        let rows = self.select(
            conn,
            &self.fact_predicate(owner, key),
            Direction::Descending,
            Some(1),
        )?;
        Ok(rows.into_iter().next())
    }

    /// Version with the given cid, scoped to its owner.
    pub fn by_cid(
        &self,
        conn: &Connection,
        owner: Option<&str>,
        cid: i64,
    ) -> StrataResult<Option<VersionedRecord>> {
        let predicate = Predicate::all(vec![
            owner_predicate(owner),
            Predicate::compare(Column::Cid, CompareOp::Eq, cid),
        ]);
        Ok(self
            .select(conn, &predicate, Direction::Ascending, Some(1))?
            .into_iter()
            .next())
    }

    /// Insert a new version open until [`FOREVER`].
    pub fn insert(
        &self,
        conn: &Connection,
        cid: i64,
        owner: Option<&str>,
        key: &Fields,
        payload: &Fields,
        life_start: i64,
    ) -> StrataResult<VersionedRecord> {
        let mut params = AttributeParameters::new();
        let mut names = vec!["cid".to_string(), "owner".to_string()];
        let mut placeholders = vec![
            params.bind_i64(cid),
            params.bind(&FieldValue::from(owner.map(str::to_string)))?,
        ];
        for def in &self.schema.key {
            names.push(format!("\"{}\"", def.name));
            placeholders.push(params.bind(key.get(&def.name).unwrap_or(&FieldValue::Null))?);
        }
        for def in &self.schema.fields {
            names.push(format!("\"{}\"", def.name));
            placeholders.push(params.bind(payload.get(&def.name).unwrap_or(&FieldValue::Null))?);
        }
        names.push("life_start".to_string());
        placeholders.push(params.bind_i64(life_start));
        names.push("life_end".to_string());
        placeholders.push(params.bind_i64(FOREVER));

        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            self.schema.name,
            names.join(", "),
            placeholders.join(", ")
        );
        conn.execute(&sql, params.as_params())?;

        Ok(VersionedRecord {
            cid,
            owner: owner.map(str::to_string),
            natural_key: key.clone(),
            life_start,
            life_end: FOREVER,
            payload: payload.clone(),
        })
    }

    /// Close a live version at `life_end`. Returns false if it was not live.
    pub fn close(&self, conn: &Connection, cid: i64, life_end: i64) -> StrataResult<bool> {
        let updated = conn.execute(
            &format!(
                "UPDATE \"{}\" SET life_end = ?1 WHERE cid = ?2 AND life_end = ?3",
                self.schema.name
            ),
            rusqlite::params![life_end, cid, FOREVER],
        )?;
        Ok(updated == 1)
    }

    /// Number of stored versions for an owner.
    pub fn count(&self, conn: &Connection, owner: Option<&str>) -> StrataResult<usize> {
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\" WHERE owner IS ?1", self.schema.name),
            rusqlite::params![owner],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn query(
        &self,
        conn: &Connection,
        sql: &str,
        params: &AttributeParameters,
    ) -> StrataResult<Vec<VersionedRecord>> {
        let mut stmt = conn.prepare(sql)?;
        let results = stmt.query_map(params.as_params(), |row| Ok(self.row_to_record(row)))?;

        results
            .map(|r| r.map_err(|e| e.into()).and_then(|inner| inner))
            .collect()
    }

    fn row_to_record(&self, row: &Row<'_>) -> StrataResult<VersionedRecord> {
        let cid: i64 = row.get(0)?;
        let owner: Option<String> = row.get(1)?;

        let mut natural_key = Fields::new();
        let mut payload = Fields::new();
        let mut idx = 2;
        for def in &self.schema.key {
            natural_key.insert(def.name.clone(), read_value(row, idx, &def.field_type)?);
            idx += 1;
        }
        for def in &self.schema.fields {
            payload.insert(def.name.clone(), read_value(row, idx, &def.field_type)?);
            idx += 1;
        }

        Ok(VersionedRecord {
            cid,
            owner,
            natural_key,
            life_start: row.get(idx)?,
            life_end: row.get(idx + 1)?,
            payload,
        })
    }
}

/// Rows of one owner, or shared rows when `owner` is `None`.
pub(crate) fn owner_predicate(owner: Option<&str>) -> Predicate {
    match owner {
        Some(id) => Predicate::compare(Column::Owner, CompareOp::Eq, id),
        None => Predicate::IsNull(Column::Owner),
    }
}

fn read_value(row: &Row<'_>, idx: usize, ty: &FieldType) -> StrataResult<FieldValue> {
    let value: FieldValue = match ty {
        FieldType::Int => row.get::<_, Option<i32>>(idx)?.into(),
        FieldType::Long => row.get::<_, Option<i64>>(idx)?.into(),
        FieldType::Timestamp => row
            .get::<_, Option<i64>>(idx)?
            .map(FieldValue::Timestamp)
            .unwrap_or(FieldValue::Null),
        FieldType::Double => row.get::<_, Option<f64>>(idx)?.into(),
        FieldType::Text => row.get::<_, Option<String>>(idx)?.into(),
        FieldType::Bool => row.get::<_, Option<bool>>(idx)?.into(),
        FieldType::Collection(_) => match row.get::<_, Option<String>>(idx)? {
            Some(json) => {
                let raw: FieldValue = serde_json::from_str(&json)?;
                raw.coerce(ty).ok_or_else(|| {
                    StrataError::Internal(format!("stored collection does not fit {}: {}", ty, json))
                })?
            }
            None => FieldValue::Null,
        },
    };
    Ok(value)
}
