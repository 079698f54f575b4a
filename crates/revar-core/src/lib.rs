//! # revar-core
//!
//! Foundation types shared by every revar crate.
//!
//! - **Values**: [`Value`], the closed tagged variant held by variables and
//!   written to the persistent store
//! - **Lifetimes**: [`Lifetime`] selects no expiry, persistent, or timed
//! - **Clocks**: [`Clock`] with [`SystemClock`] and a controllable
//!   [`ManualClock`] for deterministic expiry tests
//! - **Branded IDs**: [`ScopeId`], [`TriggerId`]
//! - **Logging**: `tracing` subscriber bootstrap and log capture for tests

#![deny(unsafe_code)]

pub mod clock;
pub mod ids;
pub mod lifetime;
pub mod logging;
pub mod value;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{ScopeId, TriggerId};
pub use lifetime::Lifetime;
pub use value::Value;
