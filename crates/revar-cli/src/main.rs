//! # revar
//!
//! Command-line access to the persistent variable store: read and write
//! stored values, resolve names the way an orphan scope would, and block
//! until a variable has been written a number of times.

#![deny(unsafe_code)]

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use revar_core::SystemClock;
use revar_runtime::Runtime;
use revar_settings::{StoreBackend, settings_path};
use revar_store::{ConnectionConfig, SqliteStore};

/// Inspect and edit revar's persistent variables.
#[derive(Parser, Debug)]
#[command(name = "revar", version, about)]
struct Cli {
    /// Path to the `SQLite` store (overrides settings).
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `revar_runtime=trace` (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a stored value.
    Get {
        /// Variable name.
        name: String,
    },
    /// Store a value. Input is parsed as JSON; bare words are text.
    Set {
        /// Variable name.
        name: String,
        /// Value literal.
        value: String,
    },
    /// Delete a stored value.
    Remove {
        /// Variable name.
        name: String,
    },
    /// List stored values.
    List,
    /// Resolve names through an empty scope: stored value, else the name.
    Resolve {
        /// Names to resolve.
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Wait until a variable has been written some number of times.
    Watch {
        /// Variable name.
        name: String,
        /// Writes to wait for.
        #[arg(long, default_value_t = 1)]
        updates: u64,
        /// Polling period in milliseconds (defaults to the trigger interval).
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Give up after this many milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = revar_settings::load_settings_from_path(&settings_path())
        .context("Failed to load settings")?;
    if let Some(level) = &args.log_level {
        settings.logging.level.clone_from(level);
    }
    revar_core::logging::init_subscriber(&settings.logging.level);

    if settings.store.backend == StoreBackend::Memory {
        tracing::warn!("settings select the memory store; the CLI always uses sqlite");
    }
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| settings.store.resolved_path());
    let config = ConnectionConfig {
        pool_size: settings.store.pool_size,
        busy_timeout_ms: settings.store.busy_timeout_ms,
    };
    let store = Arc::new(
        SqliteStore::open(&db_path, &config)
            .with_context(|| format!("Failed to open store at {}", db_path.display()))?,
    );
    tracing::debug!(path = %db_path.display(), "store opened");

    let runtime = Runtime::new(settings.runtime.clone(), store.clone(), SystemClock::shared());
    let mut out = std::io::stdout().lock();

    match args.command {
        Command::Get { name } => commands::get(&store, &name, &mut out),
        Command::Set { name, value } => commands::set(&runtime, &name, &value, &mut out),
        Command::Remove { name } => commands::remove(&store, &name, &mut out),
        Command::List => commands::list(&store, &mut out),
        Command::Resolve { names } => commands::resolve(&runtime, &names, &mut out),
        Command::Watch {
            name,
            updates,
            interval_ms,
            timeout_ms,
        } => {
            let options = commands::WatchOptions {
                updates,
                interval: interval_ms.map_or_else(
                    || runtime.trigger_interval(),
                    std::time::Duration::from_millis,
                ),
                timeout: timeout_ms.map(std::time::Duration::from_millis),
            };
            commands::watch(&runtime, store, &name, options, &mut out).await
        }
    }
}
