//! Cancellation tokens and the per-key render task registry
//!
//! A render task is identified by a key (page and tier in the viewer). At
//! most one task per key is in flight: starting a new one cancels and
//! supersedes the previous one, and the superseded task can no longer
//! publish its result.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

/// Cancellation token for cooperative task cancellation
///
/// Renderers periodically check `is_cancelled()` and stop early. Clones
/// share the same underlying state.
///
/// # Example
///
/// ```
/// use pageflow_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let render_token = token.clone();
///
/// token.cancel();
/// assert!(render_token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token in the non-cancelled state
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Cancel this token and every clone of it
    ///
    /// Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle on one started render task
#[derive(Debug, Clone)]
pub struct RenderTicket<K> {
    pub key: K,
    pub generation: u64,
    pub token: CancellationToken,
}

impl<K> RenderTicket<K> {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

struct Slot {
    generation: u64,
    token: CancellationToken,
}

struct RegistryState<K> {
    next_generation: u64,
    active: HashMap<K, Slot>,
    superseded: u64,
}

/// Registry enforcing a single in-flight render task per key
///
/// # Example
///
/// ```
/// use pageflow_scheduler::RenderTaskRegistry;
///
/// let registry = RenderTaskRegistry::new();
///
/// let first = registry.begin(3_u32);
/// let second = registry.begin(3_u32);
///
/// assert!(first.is_cancelled());
/// assert!(!registry.finish(&first));
/// assert!(registry.finish(&second));
/// ```
#[derive(Clone)]
pub struct RenderTaskRegistry<K> {
    state: Arc<Mutex<RegistryState<K>>>,
}

impl<K> RenderTaskRegistry<K>
where
    K: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                next_generation: 0,
                active: HashMap::new(),
                superseded: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a task for `key`, cancelling any task already running for it
    pub fn begin(&self, key: K) -> RenderTicket<K> {
        let mut state = self.lock();

        if let Some(previous) = state.active.remove(&key) {
            previous.token.cancel();
            state.superseded += 1;
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        let token = CancellationToken::new();
        state.active.insert(key, Slot { generation, token: token.clone() });

        RenderTicket { key, generation, token }
    }

    /// Whether `ticket` still owns its key and has not been cancelled
    pub fn is_current(&self, ticket: &RenderTicket<K>) -> bool {
        let state = self.lock();
        state
            .active
            .get(&ticket.key)
            .is_some_and(|slot| slot.generation == ticket.generation && !slot.token.is_cancelled())
    }

    /// Retire a task
    ///
    /// Returns `true` only if the task was still current, meaning its result
    /// may be published. A superseded or cancelled task gets `false`.
    pub fn finish(&self, ticket: &RenderTicket<K>) -> bool {
        let mut state = self.lock();

        let owns_slot =
            state.active.get(&ticket.key).is_some_and(|slot| slot.generation == ticket.generation);
        if !owns_slot {
            return false;
        }

        state.active.remove(&ticket.key);
        !ticket.token.is_cancelled()
    }

    /// Cancel the task running for `key`
    pub fn cancel(&self, key: K) -> bool {
        match self.lock().active.remove(&key) {
            Some(slot) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every task whose key matches `predicate`
    pub fn cancel_where(&self, predicate: impl Fn(&K) -> bool) -> usize {
        let mut state = self.lock();
        let keys: Vec<K> = state.active.keys().filter(|k| predicate(k)).copied().collect();
        for key in &keys {
            if let Some(slot) = state.active.remove(key) {
                slot.token.cancel();
            }
        }
        keys.len()
    }

    /// Cancel every task
    pub fn cancel_all(&self) -> usize {
        let mut state = self.lock();
        let count = state.active.len();
        for (_, slot) in state.active.drain() {
            slot.token.cancel();
        }
        count
    }

    pub fn is_in_flight(&self, key: K) -> bool {
        self.lock().active.contains_key(&key)
    }

    /// Number of tasks in flight
    pub fn len(&self) -> usize {
        self.lock().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().active.is_empty()
    }

    /// Number of tasks cancelled by a newer task for the same key
    pub fn superseded_count(&self) -> u64 {
        self.lock().superseded
    }
}

impl<K> Default for RenderTaskRegistry<K>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
