//! Polled condition triggers.
//!
//! [`ConditionTriggerManager`] keeps an ordered list of condition/action
//! pairs. Each [`check_conditions`](ConditionTriggerManager::check_conditions)
//! pass evaluates the pairs present when the pass began; a pair whose
//! condition holds has its action run once and is then dropped. Pairs added
//! during a pass (including by actions) wait for the next pass.
//!
//! Conditions and actions run without the manager's lock held, so they may
//! register or remove pairs and read scopes freely.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use revar_core::TriggerId;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

type Condition = Box<dyn FnMut() -> bool + Send>;
type Action = Box<dyn FnOnce() + Send>;

struct TriggerPair {
    id: TriggerId,
    condition: Condition,
    action: Action,
}

#[derive(Default)]
struct Pairs {
    queued: Vec<TriggerPair>,
    /// Pairs taken out by a running pass.
    in_flight: HashSet<TriggerId>,
    /// In-flight pairs removed before the pass got back to them.
    withdrawn: HashSet<TriggerId>,
}

/// Fires one-shot actions once their conditions become true.
#[derive(Default)]
pub struct ConditionTriggerManager {
    pairs: Mutex<Pairs>,
}

impl ConditionTriggerManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a pair. The condition isn't evaluated until the next pass.
    pub fn add_pair<C, A>(&self, condition: C, action: A) -> TriggerId
    where
        C: FnMut() -> bool + Send + 'static,
        A: FnOnce() + Send + 'static,
    {
        let id = TriggerId::new();
        self.pairs.lock().queued.push(TriggerPair {
            id: id.clone(),
            condition: Box::new(condition),
            action: Box::new(action),
        });
        trace!(trigger = %id, "trigger pair added");
        id
    }

    /// Remove a pair that hasn't fired. Returns whether it was pending.
    pub fn remove_pair(&self, id: &TriggerId) -> bool {
        let mut pairs = self.pairs.lock();
        if let Some(pos) = pairs.queued.iter().position(|p| &p.id == id) {
            let _ = pairs.queued.remove(pos);
            return true;
        }
        if pairs.in_flight.remove(id) {
            let _ = pairs.withdrawn.insert(id.clone());
            return true;
        }
        false
    }

    /// Pending pairs, including those being evaluated right now.
    pub fn len(&self) -> usize {
        let pairs = self.pairs.lock();
        pairs.queued.len() + pairs.in_flight.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluate every pending pair once, in order. Returns how many fired.
    pub fn check_conditions(&self) -> usize {
        let snapshot = {
            let mut pairs = self.pairs.lock();
            let snapshot = std::mem::take(&mut pairs.queued);
            pairs.in_flight.extend(snapshot.iter().map(|p| p.id.clone()));
            snapshot
        };

        let mut kept = Vec::with_capacity(snapshot.len());
        let mut fired = 0;
        for mut pair in snapshot {
            if self.pairs.lock().withdrawn.remove(&pair.id) {
                continue;
            }
            if !(pair.condition)() {
                kept.push(pair);
                continue;
            }
            {
                let mut pairs = self.pairs.lock();
                if pairs.withdrawn.remove(&pair.id) {
                    continue;
                }
                let _ = pairs.in_flight.remove(&pair.id);
            }
            debug!(trigger = %pair.id, "trigger fired");
            (pair.action)();
            fired += 1;
        }

        let mut guard = self.pairs.lock();
        let pairs = &mut *guard;
        kept.retain(|p| {
            let _ = pairs.in_flight.remove(&p.id);
            !pairs.withdrawn.remove(&p.id)
        });
        kept.append(&mut pairs.queued);
        pairs.queued = kept;
        fired
    }

    /// Spawn a task that runs [`check_conditions`](Self::check_conditions)
    /// every `interval` until the returned handle is cancelled or dropped.
    ///
    /// The task holds only a weak reference, so it also ends once the
    /// manager is dropped. Must be called within a tokio runtime.
    pub fn start_checking_regularly(self: &Arc<Self>, interval: Duration) -> TriggerHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_checks(Arc::downgrade(self), interval, cancel.clone()));
        debug!(interval_ms = interval.as_millis(), "periodic trigger checks started");
        TriggerHandle {
            cancel,
            task: Some(task),
        }
    }
}

async fn run_checks(
    manager: Weak<ConditionTriggerManager>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let fired = manager.check_conditions();
                if fired > 0 {
                    trace!(fired, remaining = manager.len(), "trigger pass complete");
                }
            }
        }
    }
    debug!("periodic trigger checks stopped");
}

impl fmt::Debug for ConditionTriggerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionTriggerManager")
            .field("pending", &self.len())
            .finish()
    }
}

/// Handle to a periodic check task. Dropping it stops the task.
#[derive(Debug)]
pub struct TriggerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TriggerHandle {
    /// Ask the task to stop after its current pass.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that stops the task when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the task and wait for it to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TriggerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn add_does_not_evaluate() {
        let manager = ConditionTriggerManager::new();
        let evaluated = counter();
        let seen = evaluated.clone();
        let _ = manager.add_pair(
            move || {
                let _ = seen.fetch_add(1, Ordering::SeqCst);
                false
            },
            || {},
        );
        assert_eq!(evaluated.load(Ordering::SeqCst), 0);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn fires_on_second_check_exactly_once() {
        let manager = ConditionTriggerManager::new();
        let calls = counter();
        let checks = counter();
        let (c, a) = (checks.clone(), calls.clone());
        let _ = manager.add_pair(
            move || c.fetch_add(1, Ordering::SeqCst) == 1,
            move || {
                let _ = a.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert_eq!(manager.check_conditions(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(manager.check_conditions(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(manager.is_empty());
        assert_eq!(manager.check_conditions(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn order_is_preserved() {
        let manager = ConditionTriggerManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for n in 0..4 {
            let log = log.clone();
            let _ = manager.add_pair(move || n % 2 == 0, move || log.lock().push(n));
        }
        assert_eq!(manager.check_conditions(), 2);
        assert_eq!(*log.lock(), vec![0, 2]);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn pairs_added_by_actions_wait_for_next_pass() {
        let manager = Arc::new(ConditionTriggerManager::new());
        let inner_fired = Arc::new(AtomicBool::new(false));

        let registrar = manager.clone();
        let flag = inner_fired.clone();
        let _ = manager.add_pair(
            || true,
            move || {
                let _ = registrar.add_pair(|| true, move || flag.store(true, Ordering::SeqCst));
            },
        );

        assert_eq!(manager.check_conditions(), 1);
        assert!(!inner_fired.load(Ordering::SeqCst));
        assert_eq!(manager.len(), 1);

        assert_eq!(manager.check_conditions(), 1);
        assert!(inner_fired.load(Ordering::SeqCst));
    }

    #[test]
    fn added_pairs_queue_after_unfired_ones() {
        let manager = Arc::new(ConditionTriggerManager::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let open = Arc::new(AtomicBool::new(false));
        let gate = open.clone();
        let first_log = log.clone();
        let _ = manager.add_pair(
            move || gate.load(Ordering::SeqCst),
            move || first_log.lock().push("first"),
        );
        let registrar = manager.clone();
        let second_log = log.clone();
        let _ = manager.add_pair(
            || true,
            move || {
                let _ = registrar.add_pair(|| true, move || second_log.lock().push("second"));
            },
        );

        assert_eq!(manager.check_conditions(), 1);
        open.store(true, Ordering::SeqCst);
        assert_eq!(manager.check_conditions(), 2);
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn removed_pair_never_fires() {
        let manager = ConditionTriggerManager::new();
        let calls = counter();
        let a = calls.clone();
        let id = manager.add_pair(
            || true,
            move || {
                let _ = a.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert!(manager.remove_pair(&id));
        assert!(!manager.remove_pair(&id));
        assert_eq!(manager.check_conditions(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn action_can_withdraw_a_later_pair() {
        let manager = Arc::new(ConditionTriggerManager::new());
        let victim_fired = Arc::new(AtomicBool::new(false));
        let victim_id = Arc::new(Mutex::new(None::<TriggerId>));

        let remover = manager.clone();
        let target = victim_id.clone();
        let _ = manager.add_pair(
            || true,
            move || {
                if let Some(id) = target.lock().take() {
                    assert!(remover.remove_pair(&id));
                }
            },
        );
        let flag = victim_fired.clone();
        let id = manager.add_pair(|| true, move || flag.store(true, Ordering::SeqCst));
        *victim_id.lock() = Some(id);

        assert_eq!(manager.check_conditions(), 1);
        assert!(!victim_fired.load(Ordering::SeqCst));
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_checks_fire_within_an_interval() {
        let manager = Arc::new(ConditionTriggerManager::new());
        let ready = Arc::new(AtomicBool::new(false));
        let fired = Arc::new(AtomicBool::new(false));
        let (r, f) = (ready.clone(), fired.clone());
        let _ = manager.add_pair(
            move || r.load(Ordering::SeqCst),
            move || f.store(true, Ordering::SeqCst),
        );

        let handle = manager.start_checking_regularly(Duration::from_millis(100));
        time::sleep(Duration::from_millis(250)).await;
        assert!(!fired.load(Ordering::SeqCst));

        ready.store(true, Ordering::SeqCst);
        time::sleep(Duration::from_millis(100)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(manager.is_empty());

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_handle_halts_checks() {
        let manager = Arc::new(ConditionTriggerManager::new());
        let checks = counter();
        let c = checks.clone();
        let _ = manager.add_pair(
            move || {
                let _ = c.fetch_add(1, Ordering::SeqCst);
                false
            },
            || {},
        );

        let handle = manager.start_checking_regularly(Duration::from_millis(10));
        time::sleep(Duration::from_millis(35)).await;
        handle.stop().await;
        let seen = checks.load(Ordering::SeqCst);
        assert!(seen >= 3);

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(checks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_cancels() {
        let manager = Arc::new(ConditionTriggerManager::new());
        let handle = manager.start_checking_regularly(Duration::from_millis(10));
        let token = handle.cancellation_token();
        assert!(!handle.is_cancelled());
        drop(handle);
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn task_ends_when_manager_dropped() {
        let manager = Arc::new(ConditionTriggerManager::new());
        let mut handle = manager.start_checking_regularly(Duration::from_millis(10));
        drop(manager);
        let task = handle.task.take().unwrap();
        time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
