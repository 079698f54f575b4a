//! Assembling a runtime from settings.
//!
//! [`Runtime`] bundles what an embedder usually needs together: the
//! persistent store picked by [`StoreSettings`], a root [`Scope`], a shared
//! [`ConditionTriggerManager`], and the assignment defaults.

use std::sync::Arc;
use std::time::Duration;

use revar_core::{Clock, SystemClock, Value};
use revar_settings::{RevarSettings, RuntimeSettings, StoreBackend, StoreSettings};
use revar_store::{ConnectionConfig, MemoryStore, PersistentStore, SqliteStore};
use tracing::info;

use crate::errors::Result;
use crate::scope::{AssignOptions, Scope};
use crate::trigger::{ConditionTriggerManager, TriggerHandle};

/// Open the store selected by `settings`.
pub fn open_store(settings: &StoreSettings) -> Result<Arc<dyn PersistentStore>> {
    match settings.backend {
        StoreBackend::Memory => {
            info!("using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sqlite => {
            let path = settings.resolved_path();
            let config = ConnectionConfig {
                pool_size: settings.pool_size,
                busy_timeout_ms: settings.busy_timeout_ms,
            };
            let store = SqliteStore::open(&path, &config)?;
            info!(path = %path.display(), "opened sqlite store");
            Ok(Arc::new(store))
        }
    }
}

/// A root scope, its store, and a trigger manager sharing one configuration.
#[derive(Debug)]
pub struct Runtime {
    settings: RuntimeSettings,
    root: Arc<Scope>,
    triggers: Arc<ConditionTriggerManager>,
}

impl Runtime {
    /// Build from explicit parts.
    pub fn new(
        settings: RuntimeSettings,
        store: Arc<dyn PersistentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            root: Scope::root(store, clock),
            triggers: Arc::new(ConditionTriggerManager::new()),
        }
    }

    /// Build from loaded settings with the system clock.
    pub fn from_settings(settings: &RevarSettings) -> Result<Self> {
        let store = open_store(&settings.store)?;
        Ok(Self::new(
            settings.runtime.clone(),
            store,
            SystemClock::shared(),
        ))
    }

    /// The root scope.
    pub fn root(&self) -> &Arc<Scope> {
        &self.root
    }

    /// The shared trigger manager.
    pub fn triggers(&self) -> &Arc<ConditionTriggerManager> {
        &self.triggers
    }

    /// Runtime settings in effect.
    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Assignment options with the configured defaults.
    pub fn assign_options(&self) -> AssignOptions {
        AssignOptions::from_settings(&self.settings)
    }

    /// Start periodic trigger checks at the configured interval.
    pub fn start_triggers(&self) -> TriggerHandle {
        self.triggers
            .start_checking_regularly(self.settings.trigger_interval())
    }

    /// Wait for `count` more writes to `name` in `scope`, bounded by the
    /// configured `next` timeout if there is one.
    pub async fn next(&self, scope: &Scope, name: &str, count: u64) -> Result<Value> {
        let wait = scope.next(name, count)?;
        match self.settings.next_timeout() {
            Some(limit) => wait.timeout(limit).await,
            None => wait.await,
        }
    }

    /// Configured trigger interval.
    pub fn trigger_interval(&self) -> Duration {
        self.settings.trigger_interval()
    }
}
