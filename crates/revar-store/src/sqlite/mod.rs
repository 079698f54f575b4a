//! `SQLite` backend for the persistent store.
//!
//! - **[`connection`]**: `r2d2` pool with WAL mode applied to every connection
//! - **[`migrations`]**: version-tracked schema, embedded at compile time
//! - **[`store`]**: [`SqliteStore`], the [`PersistentStore`](crate::PersistentStore)
//!   implementation

pub mod connection;
pub mod migrations;
pub mod store;

pub use connection::{ConnectionConfig, ConnectionPool, new_file, new_in_memory};
pub use migrations::{current_version, latest_version, run_migrations};
pub use store::{SqliteStore, StoredEntry};
