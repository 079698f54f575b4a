//! # revar-runtime
//!
//! Reactive variables with priority-gated assignment, history, expiry, and
//! "wait for N updates", organised into lexical scope chains, plus a polled
//! condition/action trigger manager.
//!
//! - **[`VariableState`]**: one named value and its gate, history, expiry,
//!   and waiters
//! - **[`Scope`]**: parent-linked namespaces with store and literal fallback
//! - **[`ConditionTriggerManager`]**: one-shot actions fired when a predicate
//!   holds, checked on demand or on an interval
//! - **[`Runtime`]**: the above wired together from settings

#![deny(unsafe_code)]

pub mod errors;
pub mod runtime;
pub mod scope;
pub mod trigger;
pub mod variable;
pub mod waiter;

pub use errors::{Result, RuntimeError};
pub use runtime::{Runtime, open_store};
pub use scope::{AssignOptions, Scope};
pub use trigger::{ConditionTriggerManager, TriggerHandle};
pub use variable::{Expiry, VariableSnapshot, VariableState};
pub use waiter::UpdateWait;
