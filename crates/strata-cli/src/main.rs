//! strata - command-line front end for a versioned fact store.
//!
//! Every command works against one schema, given as a JSON descriptor file,
//! and prints JSON lines on stdout. Logs go to stderr.
//!
//! # Configuration
//!
//! - `STRATA_DB_PATH` - database file, defaults to `~/.strata/strata.db`
//! - `STRATA_PAGE_SIZE`, `STRATA_MAX_PAGE_SIZE`, `STRATA_BUSY_TIMEOUT_MS`
//! - `RUST_LOG` - log filter, defaults to `info`
//!
//! A `.env` file in the working directory is loaded first.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use strata_core::{SchemaDescriptor, StoreConfig, TemporalStore};

mod commands;

use commands::Command;

#[derive(Parser)]
#[command(
    name = "strata",
    about = "Point-in-time versioned fact store",
    version
)]
struct Cli {
    /// Path to the JSON schema descriptor.
    #[arg(short, long, global = true, default_value = "schema.json")]
    schema: PathBuf,

    /// Database file (overrides config and environment).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (toml, json, or yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(false),
        )
        .with(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok()))
        .init();

    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let raw = std::fs::read_to_string(&cli.schema)
        .with_context(|| format!("reading schema descriptor {}", cli.schema.display()))?;
    let schema = SchemaDescriptor::from_json(&raw)?;

    tracing::debug!(db = %config.db_path.display(), table = %schema.name, "opening store");
    let store = TemporalStore::open(config, schema)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    commands::run(&store, cli.command, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Filter from `RUST_LOG` directives, falling back to `info` when they are
/// absent or malformed.
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn load_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)?,
        None => StoreConfig::from_env()?,
    };
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_log_filter_defaults_to_info() {
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(
            log_filter(Some("strata=loud".to_string())).max_level_hint(),
            Some(LevelFilter::INFO)
        );
        assert_eq!(
            log_filter(Some("debug".to_string())).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
    }
}
