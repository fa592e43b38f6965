//! Subcommands and their execution.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::de::DeserializeOwned;
use serde::Serialize;

use strata_core::{
    Direction, FieldSelector, Fields, LifelineSelector, OwnerScope, PageRequest, TemporalStore,
    TransactionRunner,
};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the schema table if it does not exist.
    Init,

    /// Record the state of a fact.
    Upsert {
        /// Owner id; omit for shared facts.
        #[arg(long)]
        owner: Option<String>,

        /// Natural key as a JSON object.
        #[arg(long)]
        key: String,

        /// Payload as a JSON object.
        #[arg(long)]
        payload: String,

        /// Milliseconds since epoch; defaults to now.
        #[arg(long)]
        as_of: Option<i64>,
    },

    /// Close the live version of a fact.
    Retract {
        #[arg(long)]
        owner: Option<String>,

        #[arg(long)]
        key: String,

        #[arg(long)]
        as_of: i64,
    },

    /// Show the version of a fact live at an instant.
    Live {
        #[arg(long)]
        owner: Option<String>,

        #[arg(long)]
        key: String,

        /// Defaults to now.
        #[arg(long)]
        as_of: Option<i64>,
    },

    /// Show every version of a fact.
    History {
        #[arg(long)]
        owner: Option<String>,

        #[arg(long)]
        key: String,
    },

    /// Fetch one page of versions matching selectors.
    Query {
        #[arg(long)]
        owner: Option<String>,

        /// Last cid of the previous page.
        #[arg(long)]
        cursor: Option<i64>,

        #[arg(long)]
        limit: Option<i64>,

        /// ascending or descending.
        #[arg(long, default_value = "ascending")]
        direction: Direction,

        /// Lifeline selector as JSON, e.g. `{"live_at": 1700000000000}`.
        #[arg(long)]
        lifeline: Option<String>,

        /// Field selectors as a JSON array.
        #[arg(long)]
        selectors: Option<String>,
    },
}

/// Execute `command`, writing one JSON document per line to `out`.
pub fn run<R: TransactionRunner, W: Write>(
    store: &TemporalStore<R>,
    command: Command,
    out: &mut W,
) -> Result<()> {
    match command {
        Command::Init => {
            let schema = store.schema();
            emit(
                out,
                &serde_json::json!({
                    "table": schema.name,
                    "key": schema.key,
                    "fields": schema.fields,
                }),
            )?;
        }
        Command::Upsert {
            owner,
            key,
            payload,
            as_of,
        } => {
            let key: Fields = parse_json("key", &key)?;
            let payload: Fields = parse_json("payload", &payload)?;
            let outcome = match as_of {
                Some(at) => store.upsert(owner.as_deref(), &key, &payload, at)?,
                None => store.upsert_now(owner.as_deref(), &key, &payload)?,
            };
            emit(out, &outcome)?;
        }
        Command::Retract { owner, key, as_of } => {
            let key: Fields = parse_json("key", &key)?;
            let retracted = store.retract(owner.as_deref(), &key, as_of)?;
            emit(out, &serde_json::json!({ "retracted": retracted }))?;
        }
        Command::Live { owner, key, as_of } => {
            let key: Fields = parse_json("key", &key)?;
            let record = match as_of {
                Some(at) => store.get_live_at(owner.as_deref(), &key, at)?,
                None => store.get_live(owner.as_deref(), &key)?,
            };
            if let Some(record) = record {
                emit(out, &record)?;
            }
        }
        Command::History { owner, key } => {
            let key: Fields = parse_json("key", &key)?;
            for record in store.history(owner.as_deref(), &key)? {
                emit(out, &record)?;
            }
        }
        Command::Query {
            owner,
            cursor,
            limit,
            direction,
            lifeline,
            selectors,
        } => {
            let request = PageRequest {
                lifeline: match lifeline {
                    Some(raw) => parse_json::<LifelineSelector>("lifeline", &raw)?,
                    None => LifelineSelector::Live,
                },
                selectors: match selectors {
                    Some(raw) => parse_json::<Vec<FieldSelector>>("selectors", &raw)?,
                    None => Vec::new(),
                },
                cursor,
                direction,
                limit,
            };
            let scope = OwnerScope::from_option(owner.as_deref());
            for record in store.access_query(&scope, &request)? {
                emit(out, &record)?;
            }
        }
    }
    Ok(())
}

fn parse_json<T: DeserializeOwned>(what: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).with_context(|| format!("invalid {} JSON: {}", what, raw))
}

fn emit<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
