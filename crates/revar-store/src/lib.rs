//! # revar-store
//!
//! Persistent key-value storage for revar variables.
//!
//! Variables declared with an infinite lifetime mirror every accepted value
//! into a [`PersistentStore`], and orphan scopes fall back to it when a name
//! isn't bound anywhere in their chain. Two implementations ship here:
//!
//! - [`MemoryStore`]: a process-local map, for tests and embedding
//! - [`SqliteStore`]: a `SQLite` table behind an `r2d2` pool
//!
//! The store is last-write-wins and non-transactional.

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod sqlite;

use std::fmt;

use revar_core::Value;

pub use errors::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::{ConnectionConfig, SqliteStore, StoredEntry};

/// A persistent name → value store shared by every scope of a runtime.
pub trait PersistentStore: Send + Sync + fmt::Debug {
    /// Look up a stored value.
    fn get(&self, name: &str) -> Result<Option<Value>>;

    /// Store a value, replacing any previous one.
    fn set(&self, name: &str, value: &Value) -> Result<()>;

    /// Delete a stored value. Returns whether anything was removed.
    fn remove(&self, name: &str) -> Result<bool>;

    /// All stored names, sorted.
    fn names(&self) -> Result<Vec<String>>;
}
