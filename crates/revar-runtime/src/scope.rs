//! Lexical scope chains.
//!
//! A [`Scope`] owns the variables first assigned in it and holds a weak
//! reference to its parent. Resolution walks outward from the calling scope;
//! the first scope that binds a name owns it, so assignment from an inner
//! scope updates the outer binding instead of shadowing it.
//!
//! A scope whose parent was dropped, or a root, is an orphan. When a name
//! isn't bound anywhere in the chain, reads fall back to the persistent
//! store, and then to the name itself as a literal.
//!
//! Each scope guards its variable map with its own lock. A scope's lock is
//! always released before its parent's is taken.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use revar_core::{Clock, Lifetime, ScopeId, Value};
use revar_settings::RuntimeSettings;
use revar_store::PersistentStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::errors::{Result, RuntimeError};
use crate::variable::{VariableSnapshot, VariableState};
use crate::waiter::UpdateWait;

/// Parameters for creating a variable on first assignment.
///
/// Only `priority` matters once the variable exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssignOptions {
    /// Whether writes after the first are accepted.
    pub allow_reassign: bool,
    /// Priority of this write.
    pub priority: i64,
    /// Lifetime used if the variable is created.
    pub lifetime: Lifetime,
}

impl Default for AssignOptions {
    fn default() -> Self {
        Self {
            allow_reassign: true,
            priority: 0,
            lifetime: Lifetime::Scoped,
        }
    }
}

impl AssignOptions {
    /// Defaults taken from runtime settings.
    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        Self {
            allow_reassign: settings.allow_reassign,
            priority: settings.default_priority,
            lifetime: Lifetime::Scoped,
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Set the lifetime.
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Set whether reassignment is allowed.
    #[must_use]
    pub fn with_reassign(mut self, allow_reassign: bool) -> Self {
        self.allow_reassign = allow_reassign;
        self
    }
}

/// A node in a chain of variable namespaces.
pub struct Scope {
    id: ScopeId,
    depth: usize,
    parent: Option<Weak<Scope>>,
    variables: Mutex<HashMap<String, VariableState>>,
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn Clock>,
}

impl Scope {
    /// Create a root scope.
    pub fn root(store: Arc<dyn PersistentStore>, clock: Arc<dyn Clock>) -> Arc<Self> {
        let scope = Arc::new(Self {
            id: ScopeId::new(),
            depth: 0,
            parent: None,
            variables: Mutex::new(HashMap::new()),
            store,
            clock,
        });
        debug!(scope = %scope.id, "root scope created");
        scope
    }

    /// Create a child scope. The child doesn't keep `self` alive.
    pub fn child(self: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            id: ScopeId::new(),
            depth: self.depth + 1,
            parent: Some(Arc::downgrade(self)),
            variables: Mutex::new(HashMap::new()),
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        })
    }

    /// Scope ID.
    pub fn id(&self) -> &ScopeId {
        &self.id
    }

    /// Nesting depth at creation (root is 0).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The parent, if it is still alive.
    pub fn parent(&self) -> Option<Arc<Scope>> {
        self.parent.as_ref()?.upgrade()
    }

    /// Whether this scope has no live parent.
    pub fn is_orphan(&self) -> bool {
        self.parent().is_none()
    }

    /// The shared persistent store.
    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    /// Whether `name` is bound in this scope itself.
    pub fn binds_locally(&self, name: &str) -> bool {
        self.variables.lock().contains_key(name)
    }

    /// Whether `name` is bound here or in any live ancestor.
    pub fn has_var(&self, name: &str) -> bool {
        self.with_owner(name, |_| ()).is_some()
    }

    /// Names bound in this scope, sorted.
    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.variables.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Run `f` on the variable that owns `name`, searching outward.
    fn with_owner<R>(&self, name: &str, f: impl FnOnce(&mut VariableState) -> R) -> Option<R> {
        {
            let mut variables = self.variables.lock();
            if let Some(var) = variables.get_mut(name) {
                return Some(f(var));
            }
        }
        self.parent()?.with_owner(name, f)
    }

    /// Read-only access to the variable that owns `name`.
    ///
    /// Expiry isn't applied; use [`get_var`](Self::get_var) for the value.
    ///
    /// `f` runs while the owning scope's lock is held. It must not call back
    /// into this scope or its chain (no `get_var`, `assign`, and so on on
    /// any related scope), or it deadlocks. Use [`snapshot`](Self::snapshot)
    /// when the caller needs to do more than read fields.
    pub fn with_var<R>(&self, name: &str, f: impl FnOnce(&VariableState) -> R) -> Option<R> {
        self.with_owner(name, |var| f(var))
    }

    /// Owned copy of the variable that owns `name`, taken under the lock
    /// and returned after it is released.
    pub fn snapshot(&self, name: &str) -> Option<VariableSnapshot> {
        self.with_owner(name, |var| var.snapshot())
    }

    /// Assign through the chain.
    ///
    /// If some scope already binds `name` the write goes to that variable
    /// (and `options` other than the priority are ignored). Otherwise a new
    /// variable is created here with `options`. A rejected write is
    /// `Ok(false)`.
    #[instrument(skip(self, value), fields(scope = %self.id), level = "debug")]
    pub fn assign(&self, name: &str, value: Value, options: AssignOptions) -> Result<bool> {
        let mut pending = Some(value);
        if let Some(result) = self.with_owner(name, |var| {
            var.assign(pending.take().unwrap_or_default(), options.priority)
        }) {
            return result;
        }
        let value = pending.unwrap_or_default();

        let mut variables = self.variables.lock();
        if let Some(var) = variables.get_mut(name) {
            return var.assign(value, options.priority);
        }
        let mut var = VariableState::new(
            name,
            options.allow_reassign,
            options.priority,
            options.lifetime,
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
        );
        let accepted = var.assign(value, options.priority)?;
        let _ = variables.insert(name.to_owned(), var);
        debug!(name, lifetime = ?options.lifetime, "variable declared");
        Ok(accepted)
    }

    /// Resolve `name`: bound variable, then persistent store, then the name
    /// itself as text.
    pub fn get_var(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.with_owner(name, VariableState::get) {
            return Ok(value);
        }
        match self.store.get(name)? {
            Some(value) => Ok(value),
            None => Ok(Value::Text(name.to_owned())),
        }
    }

    /// `n` steps back in the history of `name`.
    pub fn previous(&self, name: &str, n: usize) -> Result<Value> {
        self.with_owner(name, |var| var.previous(n))
            .ok_or_else(|| RuntimeError::UnknownVariable(name.to_owned()))?
    }

    /// Like [`previous`](Self::previous), with the garbage-number fallback
    /// for reads past the recorded history.
    pub fn previous_or_garbage(&self, name: &str, n: usize) -> Result<Value> {
        self.with_owner(name, |var| var.previous_or_garbage(n))
            .ok_or_else(|| RuntimeError::UnknownVariable(name.to_owned()))
    }

    /// Register a wait for `count` more accepted writes to `name`.
    ///
    /// The wait is registered before this returns, so writes made after the
    /// call count toward it even if the future hasn't been polled yet.
    pub fn next(&self, name: &str, count: u64) -> Result<UpdateWait> {
        self.with_owner(name, |var| var.next(count))
            .ok_or_else(|| RuntimeError::UnknownVariable(name.to_owned()))
    }

    /// [`next`](Self::next) bounded by `limit`.
    pub async fn next_timeout(&self, name: &str, count: u64, limit: Duration) -> Result<Value> {
        self.next(name, count)?.timeout(limit).await
    }

    /// [`next`](Self::next) that gives up when `cancel` fires.
    pub async fn next_until(
        &self,
        name: &str,
        count: u64,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.next(name, count)?.until(cancel).await
    }

    /// Kill `name` in its owning scope.
    pub fn kill(&self, name: &str) -> Result<()> {
        self.with_owner(name, VariableState::kill)
            .ok_or_else(|| RuntimeError::UnknownVariable(name.to_owned()))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("depth", &self.depth)
            .field("orphan", &self.is_orphan())
            .field("variables", &self.local_names())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use revar_core::{ManualClock, SystemClock};
    use revar_store::MemoryStore;

    use super::*;

    fn root() -> Arc<Scope> {
        Scope::root(Arc::new(MemoryStore::new()), SystemClock::shared())
    }

    fn opts() -> AssignOptions {
        AssignOptions::default()
    }

    #[test]
    fn first_assignment_binds_locally() {
        let root = root();
        let child = root.child();
        assert!(child.assign("x", Value::from(1), opts()).unwrap());
        assert!(child.binds_locally("x"));
        assert!(!root.has_var("x"));
        assert_eq!(child.local_names(), vec!["x"]);
    }

    #[test]
    fn child_assignment_forwards_to_parent() {
        let parent = root();
        let child = parent.child();
        assert!(parent.assign("x", Value::from(1), opts()).unwrap());
        assert!(child.assign("x", Value::from(2), opts()).unwrap());

        assert!(!child.binds_locally("x"));
        assert_eq!(child.get_var("x").unwrap(), Value::from(2));
        assert_eq!(parent.get_var("x").unwrap(), Value::from(2));
        assert_eq!(parent.with_var("x", VariableState::update_count), Some(2));
    }

    #[test]
    fn snapshot_can_be_used_with_the_chain() {
        let parent = root();
        let child = parent.child();
        assert!(parent.assign("x", Value::from(1), opts()).unwrap());
        assert!(child.assign("x", Value::from(2), opts().with_priority(3)).unwrap());

        let snap = child.snapshot("x").unwrap();
        assert_eq!(snap.name, "x");
        assert_eq!(snap.value, Value::from(2));
        assert_eq!(snap.history, vec![Value::Empty, Value::from(1), Value::from(2)]);
        assert_eq!(snap.update_count, 2);
        assert_eq!(snap.priority, 3);
        assert_eq!(snap.pending_waiters, 0);

        // The lock is released, so the chain is usable while the copy lives.
        assert!(child.assign("x", Value::from(3), opts().with_priority(3)).unwrap());
        assert_eq!(child.get_var("x").unwrap(), Value::from(3));
        assert_eq!(snap.value, Value::from(2));
        assert!(child.snapshot("missing").is_none());
    }

    #[test]
    fn forwarding_skips_intermediate_scopes() {
        let top = root();
        let mid = top.child();
        let leaf = mid.child();
        assert!(top.assign("x", Value::from("a"), opts()).unwrap());
        assert!(leaf.assign("x", Value::from("b"), opts()).unwrap());
        assert!(!mid.binds_locally("x"));
        assert_eq!(top.get_var("x").unwrap(), Value::from("b"));
        assert_eq!(leaf.depth(), 2);
    }

    #[test]
    fn existing_binding_uses_its_own_gate() {
        let parent = root();
        let child = parent.child();
        assert!(
            parent
                .assign("x", Value::from(1), opts().with_reassign(false))
                .unwrap()
        );
        assert!(!child.assign("x", Value::from(2), opts()).unwrap());
        assert_eq!(child.get_var("x").unwrap(), Value::from(1));
    }

    #[test]
    fn unbound_name_falls_back_to_store_then_literal() {
        let store = Arc::new(MemoryStore::with_entries([("saved", Value::from(42))]));
        let root = Scope::root(store, SystemClock::shared());
        let child = root.child();
        assert_eq!(child.get_var("saved").unwrap(), Value::from(42));
        assert_eq!(child.get_var("bare").unwrap(), Value::from("bare"));
    }

    #[test]
    fn dropped_parent_orphans_child() {
        let parent = root();
        let child = parent.child();
        assert!(parent.assign("x", Value::from(1), opts()).unwrap());
        drop(parent);

        assert!(child.is_orphan());
        assert!(!child.has_var("x"));
        assert_eq!(child.get_var("x").unwrap(), Value::from("x"));
        assert!(child.assign("x", Value::from(5), opts()).unwrap());
        assert!(child.binds_locally("x"));
    }

    #[test]
    fn dropping_child_keeps_ancestors() {
        let parent = root();
        let child = parent.child();
        assert!(parent.assign("x", Value::from(1), opts()).unwrap());
        assert!(child.assign("y", Value::from(2), opts()).unwrap());
        drop(child);
        assert_eq!(parent.get_var("x").unwrap(), Value::from(1));
        assert!(!parent.has_var("y"));
    }

    #[test]
    fn infinite_assignment_reaches_store() {
        let store = Arc::new(MemoryStore::new());
        let root = Scope::root(store.clone(), SystemClock::shared());
        let child = root.child();
        assert!(
            child
                .assign("kept", Value::from(true), opts().with_lifetime(Lifetime::Infinite))
                .unwrap()
        );
        assert_eq!(store.get("kept").unwrap(), Some(Value::from(true)));
        drop(child);
        assert_eq!(root.get_var("kept").unwrap(), Value::from(true));
    }

    #[test]
    fn timed_variable_expires_through_scope() {
        let clock = Arc::new(ManualClock::starting_now());
        let root = Scope::root(Arc::new(MemoryStore::new()), clock.clone());
        let lifetime = Lifetime::Timed(Duration::from_secs(30));
        assert!(
            root.assign("t", Value::from(1), opts().with_lifetime(lifetime))
                .unwrap()
        );
        clock.advance(Duration::from_secs(31));
        assert_eq!(root.get_var("t").unwrap(), Value::Empty);
        assert_eq!(root.previous("t", 1).unwrap(), Value::from(1));
    }

    #[test]
    fn unknown_names_are_errors_for_history_ops() {
        let root = root();
        assert_matches!(root.previous("nope", 1), Err(RuntimeError::UnknownVariable(_)));
        assert_matches!(root.previous_or_garbage("nope", 1), Err(RuntimeError::UnknownVariable(_)));
        assert_matches!(root.next("nope", 1), Err(RuntimeError::UnknownVariable(_)));
        assert_matches!(root.kill("nope"), Err(RuntimeError::UnknownVariable(_)));
    }

    #[test]
    fn kill_routes_to_owner() {
        let parent = root();
        let child = parent.child();
        assert!(parent.assign("x", Value::from(1), opts()).unwrap());
        child.kill("x").unwrap();
        assert_eq!(parent.get_var("x").unwrap(), Value::Empty);
    }

    #[tokio::test]
    async fn next_through_child() {
        let parent = root();
        let child = parent.child();
        assert!(parent.assign("x", Value::from(0), opts()).unwrap());
        let wait = child.next("x", 2).unwrap();
        assert!(child.assign("x", Value::from(1), opts()).unwrap());
        assert!(parent.assign("x", Value::from(2), opts()).unwrap());
        assert_eq!(wait.await.unwrap(), Value::from(2));
    }

    #[tokio::test(start_paused = true)]
    async fn next_timeout_expires() {
        let root = root();
        assert!(root.assign("x", Value::from(0), opts()).unwrap());
        let result = root.next_timeout("x", 1, Duration::from_secs(1)).await;
        assert_matches!(result, Err(RuntimeError::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn next_until_cancelled() {
        let root = root();
        assert!(root.assign("x", Value::from(0), opts()).unwrap());
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_matches!(
            root.next_until("x", 1, &cancel).await,
            Err(RuntimeError::Cancelled)
        );
    }

    #[tokio::test]
    async fn dropping_owner_abandons_wait() {
        let parent = root();
        let child = parent.child();
        assert!(parent.assign("x", Value::from(0), opts()).unwrap());
        let wait = child.next("x", 1).unwrap();
        drop(parent);
        assert_matches!(wait.await, Err(RuntimeError::WaitAbandoned(_)));
    }

    #[test]
    fn options_from_settings() {
        let settings = RuntimeSettings {
            default_priority: 7,
            allow_reassign: false,
            ..RuntimeSettings::default()
        };
        let options = AssignOptions::from_settings(&settings);
        assert_eq!(options.priority, 7);
        assert!(!options.allow_reassign);
        assert_eq!(options.lifetime, Lifetime::Scoped);
    }
}
