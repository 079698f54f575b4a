//! Subcommand implementations.
//!
//! Each command writes its output to the given writer so tests can capture
//! it.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use revar_core::{Lifetime, Value};
use revar_runtime::Runtime;
use revar_store::{PersistentStore, SqliteStore};
use tokio::sync::oneshot;

/// Print a stored value.
pub fn get(store: &SqliteStore, name: &str, out: &mut impl Write) -> Result<()> {
    let Some(value) = store.get(name).context("Failed to read store")? else {
        bail!("{name} is not stored");
    };
    writeln!(out, "{value}")?;
    Ok(())
}

/// Store a value through the root scope as a persistent variable.
pub fn set(runtime: &Runtime, name: &str, raw: &str, out: &mut impl Write) -> Result<()> {
    let value = Value::parse_literal(raw);
    let options = runtime
        .assign_options()
        .with_lifetime(Lifetime::Infinite);
    let accepted = runtime
        .root()
        .assign(name, value.clone(), options)
        .with_context(|| format!("Failed to store {name}"))?;
    if !accepted {
        bail!("assignment to {name} was rejected");
    }
    writeln!(out, "{name} = {value}")?;
    Ok(())
}

/// Delete a stored value.
pub fn remove(store: &SqliteStore, name: &str, out: &mut impl Write) -> Result<()> {
    if !store.remove(name).context("Failed to update store")? {
        bail!("{name} is not stored");
    }
    writeln!(out, "removed {name}")?;
    Ok(())
}

/// List every stored value with its write count and last write time.
pub fn list(store: &SqliteStore, out: &mut impl Write) -> Result<()> {
    for entry in store.entries().context("Failed to read store")? {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            entry.name,
            entry.value,
            entry.write_count,
            entry.updated_at.to_rfc3339()
        )?;
    }
    Ok(())
}

/// Resolve each name from the root scope: stored value, else the name.
pub fn resolve(runtime: &Runtime, names: &[String], out: &mut impl Write) -> Result<()> {
    for name in names {
        let value = runtime
            .root()
            .get_var(name)
            .with_context(|| format!("Failed to resolve {name}"))?;
        writeln!(out, "{name} = {value}")?;
    }
    Ok(())
}

/// Parameters for [`watch`].
#[derive(Clone, Copy, Debug)]
pub struct WatchOptions {
    /// Writes to wait for, counted from now.
    pub updates: u64,
    /// Polling period.
    pub interval: Duration,
    /// Overall limit, if any.
    pub timeout: Option<Duration>,
}

/// Block until `name` has been written `options.updates` more times, then
/// print its value.
///
/// Polls the store's write counter through a trigger pair, so rewrites of an
/// identical value count too.
pub async fn watch(
    runtime: &Runtime,
    store: Arc<SqliteStore>,
    name: &str,
    options: WatchOptions,
    out: &mut impl Write,
) -> Result<()> {
    let baseline = store
        .write_count(name)
        .context("Failed to read store")?
        .unwrap_or(0);
    let target = baseline.saturating_add(options.updates);
    tracing::debug!(name, baseline, target, "watching");

    let (tx, rx) = oneshot::channel();
    let probe = Arc::clone(&store);
    let watched = name.to_owned();
    let _ = runtime.triggers().add_pair(
        move || match probe.write_count(&watched) {
            Ok(count) => count.unwrap_or(0) >= target,
            Err(error) => {
                tracing::warn!(name = %watched, %error, "store poll failed");
                false
            }
        },
        move || {
            let _ = tx.send(());
        },
    );

    let handle = runtime.triggers().start_checking_regularly(options.interval);
    let reached = match options.timeout {
        Some(limit) => tokio::time::timeout(limit, rx).await.ok(),
        None => Some(rx.await),
    };
    handle.stop().await;

    match reached {
        Some(Ok(())) => {
            let value = store.get(name)?.unwrap_or_default();
            writeln!(out, "{name} = {value}")?;
            Ok(())
        }
        Some(Err(_)) => bail!("watch on {name} ended before it was written"),
        None => bail!("timed out waiting for {} writes to {name}", options.updates),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
