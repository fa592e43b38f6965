//! Temporal store: versioning lifecycle and point-in-time reads.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::detector::equivalent;
use super::table::{owner_predicate, SchemaTable};
use crate::config::StoreConfig;
use crate::error::{ErrorCode, StrataError, StrataResult};
use crate::query::{Column, CompareOp, PageRequest, Predicate, QueryCompiler};
use crate::selector::{Direction, FieldSelector, LifelineSelector, OwnerScope};
use crate::storage::sequence::{ensure_sequence, next_cid};
use crate::storage::{Clock, SqliteTransactionRunner, SystemClock, TransactionRunner};
use crate::types::{
    Fields, NaturalKey, Payload, SchemaDescriptor, UpsertOutcome, VersionedRecord, FOREVER,
};

/// Versioned fact store for one schema.
///
/// Each (owner, natural key) moves through `ABSENT → LIVE(v1) → LIVE(v2) …`;
/// an upsert either leaves the live version alone or closes it and opens a
/// successor in the same transaction. Versions are never deleted.
pub struct TemporalStore<R: TransactionRunner = SqliteTransactionRunner> {
    runner: Arc<R>,
    table: SchemaTable,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
}

impl TemporalStore<SqliteTransactionRunner> {
    /// Open a store backed by the configured database file.
    pub fn open(config: StoreConfig, schema: SchemaDescriptor) -> StrataResult<Self> {
        let runner = SqliteTransactionRunner::open(&config.db_path, &config)?;
        Self::new(Arc::new(runner), schema, Arc::new(SystemClock), config)
    }

    /// Open a store on a database file, overriding the configured path.
    pub fn open_path(path: impl AsRef<Path>, schema: SchemaDescriptor) -> StrataResult<Self> {
        let config = StoreConfig {
            db_path: path.as_ref().to_path_buf(),
            ..StoreConfig::default()
        };
        Self::open(config, schema)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory(schema: SchemaDescriptor) -> StrataResult<Self> {
        let runner = SqliteTransactionRunner::in_memory()?;
        Self::new(
            Arc::new(runner),
            schema,
            Arc::new(SystemClock),
            StoreConfig::default(),
        )
    }
}

impl<R: TransactionRunner> TemporalStore<R> {
    /// Build a store from its collaborators and create the schema table.
    pub fn new(
        runner: Arc<R>,
        schema: SchemaDescriptor,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> StrataResult<Self> {
        config.validate()?;
        let table = SchemaTable::new(schema)?;
        runner.execute(|tx| {
            ensure_sequence(tx)?;
            table.create(tx)
        })?;
        debug!(table = %table.schema().name, "schema ready");

        Ok(Self {
            runner,
            table,
            clock,
            config,
        })
    }

    /// Builder: replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        self.table.schema()
    }

    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }

    /// Record `candidate` as the state of a fact as of `as_of`.
    ///
    /// Writes nothing when the live version is equivalent. Fails with
    /// [`StrataError::MonotonicityViolation`] if the write would land before
    /// the fact's latest version boundary.
    pub fn upsert(
        &self,
        owner: Option<&str>,
        key: &NaturalKey,
        candidate: &Payload,
        as_of: i64,
    ) -> StrataResult<UpsertOutcome> {
        validate_owner(owner)?;
        validate_as_of(as_of)?;
        let key = self.schema().normalize_key(key)?;
        let candidate = self.schema().normalize_payload(candidate)?;
        let table_name = &self.schema().name;

        self.runner.execute(|tx| {
            let previous = self.table.latest(tx, owner, &key)?;
            match previous {
                Some(live) if live.is_live() => {
                    if as_of < live.life_start {
                        warn!(table = %table_name, cid = live.cid, as_of, life_start = live.life_start, "rejected retroactive upsert");
                        return Err(StrataError::retroactive(table_name, as_of, live.life_start));
                    }
                    if equivalent(&candidate, &live.payload) {
                        debug!(table = %table_name, cid = live.cid, "payload unchanged");
                        return Ok(UpsertOutcome::Unchanged { cid: live.cid });
                    }
                    if as_of == live.life_start {
                        warn!(table = %table_name, cid = live.cid, as_of, "rejected supersession at the version's own start");
                        return Err(StrataError::retroactive(table_name, as_of, live.life_start + 1));
                    }
                    self.table.close(tx, live.cid, as_of)?;
                    let cid = next_cid(tx)?;
                    self.table.insert(tx, cid, owner, &key, &candidate, as_of)?;
                    info!(table = %table_name, closed = live.cid, cid, as_of, "superseded version");
                    Ok(UpsertOutcome::Changed { cid })
                }
                Some(closed) if as_of < closed.life_end => {
                    warn!(table = %table_name, cid = closed.cid, as_of, life_end = closed.life_end, "rejected upsert inside retracted history");
                    Err(StrataError::retroactive(table_name, as_of, closed.life_end))
                }
                _ => {
                    let cid = next_cid(tx)?;
                    self.table.insert(tx, cid, owner, &key, &candidate, as_of)?;
                    info!(table = %table_name, cid, as_of, "created version");
                    Ok(UpsertOutcome::Changed { cid })
                }
            }
        })
    }

    /// [`Self::upsert`] as of the clock's current time.
    pub fn upsert_now(
        &self,
        owner: Option<&str>,
        key: &NaturalKey,
        candidate: &Payload,
    ) -> StrataResult<UpsertOutcome> {
        self.upsert(owner, key, candidate, self.clock.now_millis())
    }

    /// Close the live version of a fact with no successor.
    ///
    /// Returns `false` when the fact has no live version.
    pub fn retract(&self, owner: Option<&str>, key: &NaturalKey, as_of: i64) -> StrataResult<bool> {
        validate_owner(owner)?;
        validate_as_of(as_of)?;
        let key = self.schema().normalize_key(key)?;
        let table_name = &self.schema().name;

        self.runner.execute(|tx| match self.table.latest(tx, owner, &key)? {
            Some(live) if live.is_live() => {
                if as_of <= live.life_start {
                    warn!(table = %table_name, cid = live.cid, as_of, "rejected retroactive retraction");
                    return Err(StrataError::retroactive(table_name, as_of, live.life_start + 1));
                }
                self.table.close(tx, live.cid, as_of)?;
                info!(table = %table_name, cid = live.cid, as_of, "retracted version");
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    /// The version of a fact live at `as_of`, if any.
    pub fn get_live_at(
        &self,
        owner: Option<&str>,
        key: &NaturalKey,
        as_of: i64,
    ) -> StrataResult<Option<VersionedRecord>> {
        let key = self.schema().normalize_key(key)?;
        let predicate = Predicate::all(vec![
            self.table.fact_predicate(owner, &key),
            live_at(as_of),
        ]);
        let mut rows = self
            .runner
            .read(|tx| self.table.select(tx, &predicate, Direction::Ascending, Some(2)))?;
        if rows.len() > 1 {
            return Err(StrataError::Internal(format!(
                "overlapping versions in {} at {}",
                self.schema().name,
                as_of
            )));
        }
        Ok(rows.pop())
    }

    /// The current version of a fact, as of the clock's now.
    pub fn get_live(&self, owner: Option<&str>, key: &NaturalKey) -> StrataResult<Option<VersionedRecord>> {
        self.get_live_at(owner, key, self.clock.now_millis())
    }

    /// Every fact of an owner as it stood at `as_of`, ordered by cid.
    pub fn list_all_live_at(&self, owner: Option<&str>, as_of: i64) -> StrataResult<Vec<VersionedRecord>> {
        let predicate = Predicate::all(vec![owner_predicate(owner), live_at(as_of)]);
        self.runner
            .read(|tx| self.table.select(tx, &predicate, Direction::Ascending, None))
    }

    /// Per fact, the earliest version whose interval reaches `as_of` or later,
    /// ordered by cid.
    pub fn first_live_at_or_after(
        &self,
        owner: Option<&str>,
        as_of: i64,
    ) -> StrataResult<Vec<VersionedRecord>> {
        let predicate = Predicate::all(vec![
            owner_predicate(owner),
            Predicate::FirstLiveAtOrAfter {
                table: self.schema().name.clone(),
                key_columns: self.schema().key.iter().map(|d| d.name.clone()).collect(),
                at: as_of,
            },
        ]);
        self.runner
            .read(|tx| self.table.select(tx, &predicate, Direction::Ascending, None))
    }

    /// Every version of one fact, oldest first.
    pub fn history(&self, owner: Option<&str>, key: &NaturalKey) -> StrataResult<Vec<VersionedRecord>> {
        let key = self.schema().normalize_key(key)?;
        let predicate = self.table.fact_predicate(owner, &key);
        self.runner
            .read(|tx| self.table.select(tx, &predicate, Direction::Ascending, None))
    }

    /// One version by cid, scoped to its owner.
    pub fn get_by_cid(&self, owner: Option<&str>, cid: i64) -> StrataResult<Option<VersionedRecord>> {
        self.runner.read(|tx| self.table.by_cid(tx, owner, cid))
    }

    /// Number of stored versions for an owner.
    pub fn count_versions(&self, owner: Option<&str>) -> StrataResult<usize> {
        self.runner.read(|tx| self.table.count(tx, owner))
    }

    /// One page of versions matching the request.
    ///
    /// Call again with `cursor` set to the last returned cid until an empty
    /// page comes back; each match is returned exactly once.
    pub fn access_query(&self, owner: &OwnerScope, request: &PageRequest) -> StrataResult<Vec<VersionedRecord>> {
        let page = QueryCompiler::new(self.schema(), &self.config).compile(owner, request)?;
        let rows = self.runner.read(|tx| self.table.fetch_page(tx, &page))?;
        debug!(table = %self.schema().name, rows = rows.len(), limit = page.limit, "page fetched");
        Ok(rows)
    }

    /// Page query assembled from its parts.
    pub fn access_query_with(
        &self,
        owner: &OwnerScope,
        cursor: Option<i64>,
        limit: Option<i64>,
        direction: Direction,
        lifeline: LifelineSelector,
        selectors: Vec<FieldSelector>,
    ) -> StrataResult<Vec<VersionedRecord>> {
        let request = PageRequest {
            lifeline,
            selectors,
            cursor,
            direction,
            limit,
        };
        self.access_query(owner, &request)
    }
}

fn validate_owner(owner: Option<&str>) -> StrataResult<()> {
    match owner {
        Some(id) if id.trim().is_empty() => Err(StrataError::validation("owner id must not be blank")),
        _ => Ok(()),
    }
}

/// `FOREVER` marks an open interval, so no version may start or end there.
pub(crate) fn validate_as_of(as_of: i64) -> StrataResult<()> {
    if as_of >= FOREVER {
        return Err(StrataError::invalid_field(
            "as_of",
            ErrorCode::ValInvalidInput,
            format!("as_of {} is not before the open-interval sentinel", as_of),
        ));
    }
    Ok(())
}

fn live_at(as_of: i64) -> Predicate {
    Predicate::all(vec![
        Predicate::compare(Column::LifeStart, CompareOp::Le, as_of),
        Predicate::compare(Column::LifeEnd, CompareOp::Gt, as_of),
    ])
}

/// Shorthand for a single-field natural key.
pub fn key_of(name: &str, value: impl Into<crate::types::FieldValue>) -> Fields {
    Fields::new().with(name, value)
}
