//! [`VariableState`]: one named value with its priority gate, history,
//! expiry, and update waiters.
//!
//! # Assignment
//!
//! An assignment is accepted when the variable still allows writes (either
//! reassignment is enabled or nothing has been accepted yet) and its priority
//! is at least the current floor. Accepting raises the floor to the
//! assignment's priority, so equal priority may overwrite but lower may not.
//!
//! # Expiry
//!
//! Timed variables record an absolute deadline at creation. The deadline is
//! checked lazily on [`get`](VariableState::get) and
//! [`assign`](VariableState::assign); the first access after it passes kills
//! the value (pushes it to history and clears it). The kill is latched, so a
//! dead variable that is assigned again keeps the new value.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use revar_core::{Clock, Lifetime, Value};
use revar_store::PersistentStore;
use tracing::{debug, warn};

use crate::errors::{Result, RuntimeError};
use crate::waiter::{self, UpdateWait, Waiter};

/// Deadline regime derived from a [`Lifetime`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiry {
    /// Never expires by clock.
    None,
    /// Mirrored into the persistent store, never expires.
    Infinite,
    /// Expires at this instant.
    At(DateTime<Utc>),
}

/// Owned copy of a variable's observable state.
///
/// Taken without applying expiry, so `value` may belong to a variable whose
/// deadline has passed but which hasn't been read since.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableSnapshot {
    /// Variable name.
    pub name: String,
    /// Value as last written or cleared.
    pub value: Value,
    /// Past values, oldest first.
    pub history: Vec<Value>,
    /// Accepted assignments so far.
    pub update_count: u64,
    /// Current priority floor.
    pub priority: i64,
    /// Declared lifetime.
    pub lifetime: Lifetime,
    /// Outstanding `next` waits.
    pub pending_waiters: usize,
}

/// A single named, reactive value.
pub struct VariableState {
    name: String,
    value: Value,
    allow_reassign: bool,
    priority: i64,
    history: Vec<Value>,
    update_count: u64,
    lifetime: Lifetime,
    expiry: Expiry,
    expired: bool,
    waiters: Vec<Waiter>,
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn Clock>,
}

impl VariableState {
    /// Create an unassigned variable.
    ///
    /// `priority` is the initial floor. A timed lifetime starts counting now.
    pub fn new(
        name: impl Into<String>,
        allow_reassign: bool,
        priority: i64,
        lifetime: Lifetime,
        store: Arc<dyn PersistentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let expiry = match lifetime {
            Lifetime::Scoped => Expiry::None,
            Lifetime::Infinite => Expiry::Infinite,
            Lifetime::Timed(after) => Expiry::At(clock.deadline_after(after)),
        };
        Self {
            name: name.into(),
            value: Value::Empty,
            allow_reassign,
            priority,
            history: vec![Value::Empty],
            update_count: 0,
            lifetime,
            expiry,
            expired: false,
            waiters: Vec::new(),
            store,
            clock,
        }
    }

    /// Current value, after applying a pending expiry.
    pub fn get(&mut self) -> Value {
        self.expire_if_due();
        self.value.clone()
    }

    /// Try to assign a new value.
    ///
    /// Returns `Ok(false)` without touching anything when the gate rejects
    /// the write. Infinite-lifetime values are written to the store before
    /// any local change, so a store failure leaves the variable as it was.
    pub fn assign(&mut self, value: Value, priority: i64) -> Result<bool> {
        self.expire_if_due();

        if !self.accepts(priority) {
            debug!(
                name = %self.name,
                priority,
                floor = self.priority,
                update_count = self.update_count,
                "assignment rejected"
            );
            return Ok(false);
        }

        if self.expiry == Expiry::Infinite {
            self.store.set(&self.name, &value)?;
        }

        let old = std::mem::replace(&mut self.value, value);
        self.history.push(old);
        self.priority = self.priority.max(priority);
        self.update_count += 1;
        debug!(
            name = %self.name,
            priority,
            update_count = self.update_count,
            "assignment accepted"
        );

        self.resolve_waiters();
        Ok(true)
    }

    fn accepts(&self, priority: i64) -> bool {
        (self.allow_reassign || self.update_count == 0) && priority >= self.priority
    }

    fn resolve_waiters(&mut self) {
        let reached = self.update_count;
        let (ready, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.waiters)
            .into_iter()
            .filter(|w| !w.is_abandoned())
            .partition(|w| w.target <= reached);
        self.waiters = rest;
        for waiter in ready {
            waiter.resolve(self.value.clone());
        }
    }

    /// Value `n` steps back. `n == 0` is the current value, `1` the value
    /// before the last write, and `history().len()` the initial empty value.
    pub fn previous(&self, n: usize) -> Result<Value> {
        if n == 0 {
            return Ok(self.value.clone());
        }
        let available = self.history.len();
        if n > available {
            return Err(RuntimeError::HistoryUnderflow {
                name: self.name.clone(),
                requested: n,
                available,
            });
        }
        Ok(self.history[available - n].clone())
    }

    /// Like [`previous`](Self::previous), but reaching past the recorded
    /// history yields a huge random number instead of an error, the way
    /// reading uninitialized memory would.
    pub fn previous_or_garbage(&self, n: usize) -> Value {
        self.previous(n).unwrap_or_else(|err| {
            warn!(name = %self.name, error = %err, "prehistoric value requested");
            Value::Number(rand::random::<f64>() * f64::MAX)
        })
    }

    /// Wait for `count` more accepted assignments.
    ///
    /// `count == 0` resolves at once with the current value.
    pub fn next(&mut self, count: u64) -> UpdateWait {
        if count == 0 {
            let value = self.get();
            return UpdateWait::ready(&self.name, value);
        }
        let target = self.update_count.saturating_add(count);
        let (waiter, wait) = waiter::pending(&self.name, target);
        self.waiters.push(waiter);
        wait
    }

    /// Clear the value, pushing it to history.
    ///
    /// Callers driving line-based lifetimes use this directly. Priority and
    /// the reassignment flag are left alone.
    pub fn kill(&mut self) {
        let old = std::mem::take(&mut self.value);
        self.history.push(old);
        debug!(name = %self.name, "variable killed");
    }

    /// Whether the timed deadline has passed.
    pub fn is_dead(&self) -> bool {
        match self.expiry {
            Expiry::At(deadline) => self.clock.now() >= deadline,
            Expiry::None | Expiry::Infinite => false,
        }
    }

    fn expire_if_due(&mut self) {
        if !self.expired && self.is_dead() {
            self.expired = true;
            debug!(name = %self.name, "variable expired");
            self.kill();
        }
    }

    /// Variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accepted assignments so far.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Current priority floor.
    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Whether writes after the first are permitted.
    pub fn allows_reassign(&self) -> bool {
        self.allow_reassign
    }

    /// Past values, oldest first, starting with the initial empty value.
    pub fn history(&self) -> &[Value] {
        &self.history
    }

    /// Declared lifetime.
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Deadline regime.
    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    /// Outstanding `next` waits that haven't been dropped.
    pub fn pending_waiters(&self) -> usize {
        self.waiters.iter().filter(|w| !w.is_abandoned()).count()
    }

    /// Copy out the observable state.
    pub fn snapshot(&self) -> VariableSnapshot {
        VariableSnapshot {
            name: self.name.clone(),
            value: self.value.clone(),
            history: self.history.clone(),
            update_count: self.update_count,
            priority: self.priority,
            lifetime: self.lifetime,
            pending_waiters: self.pending_waiters(),
        }
    }
}

impl fmt::Debug for VariableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableState")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("priority", &self.priority)
            .field("update_count", &self.update_count)
            .field("expiry", &self.expiry)
            .field("waiters", &self.waiters.len())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
