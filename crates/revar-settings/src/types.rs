//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file only needs the fields it overrides.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "runtime": { "triggerIntervalMs": 50 },
///   "store": { "backend": "memory" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RevarSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Variable runtime defaults.
    pub runtime: RuntimeSettings,
    /// Persistent store backend.
    pub store: StoreSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for RevarSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "revar".to_string(),
            runtime: RuntimeSettings::default(),
            store: StoreSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Defaults applied when callers don't spell out assignment options, and
/// trigger polling cadence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeSettings {
    /// Priority used when an assignment doesn't name one.
    pub default_priority: i64,
    /// Whether new variables accept reassignment unless told otherwise.
    pub allow_reassign: bool,
    /// Period between trigger condition scans, in milliseconds.
    pub trigger_interval_ms: u64,
    /// Upper bound on a `next` wait, in milliseconds. `None` waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_timeout_ms: Option<u64>,
}

impl RuntimeSettings {
    /// Trigger scan period as a [`Duration`].
    pub fn trigger_interval(&self) -> Duration {
        Duration::from_millis(self.trigger_interval_ms)
    }

    /// `next` wait bound as a [`Duration`].
    pub fn next_timeout(&self) -> Option<Duration> {
        self.next_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            default_priority: 0,
            allow_reassign: true,
            trigger_interval_ms: 100,
            next_timeout_ms: None,
        }
    }
}

/// Which persistent store implementation backs infinite-lifetime variables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreBackend {
    /// Process-local map; nothing survives a restart.
    Memory,
    /// `SQLite` database file.
    #[default]
    Sqlite,
}

/// Persistent store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Backend selection.
    pub backend: StoreBackend,
    /// Database path. Relative paths resolve under `~/.revar`.
    pub path: String,
    /// Connection pool size.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl StoreSettings {
    /// Absolute database path.
    pub fn resolved_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.path);
        if path.is_absolute() {
            path
        } else {
            crate::loader::revar_home().join(path)
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: "store.db".to_string(),
            pool_size: 4,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive (overridden by `RUST_LOG`).
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}
