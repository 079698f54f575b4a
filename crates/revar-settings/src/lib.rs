//! # revar-settings
//!
//! Configuration with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RevarSettings::default()`]
//! 2. **User file**: `~/.revar/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `REVAR_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, revar_home, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<RevarSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// The first call loads from `~/.revar/settings.json` with env overrides,
/// falling back to compiled defaults if loading fails.
pub fn get_settings() -> &'static RevarSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            RevarSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: RevarSettings) -> std::result::Result<(), RevarSettings> {
    SETTINGS.set(settings)
}
