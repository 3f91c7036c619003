//! In-memory session table keyed by sender.
//!
//! Each sender gets its own slot behind a `tokio::sync::Mutex`. The ingress
//! adapter holds that lock for the whole read-decide-send-commit cycle, so
//! two events from the same sender are applied one after the other while
//! different senders proceed independently.
//!
//! The table is bounded two ways: slots idle longer than a TTL are pruned
//! by a background task, and inserting past the capacity evicts the least
//! recently seen idle slot. Evicted senders simply start over in `Idle`.
//!
//! Pruning and eviction only remove slots they can lock, and
//! [`SessionStore::lock`] only returns a guard for the slot the table still
//! holds. A locked slot is therefore always the sender's live slot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::conversation::{SenderId, SessionState};

/// Default maximum number of tracked senders.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// One sender's state plus the time it was last touched.
#[derive(Debug)]
pub struct SessionSlot {
    state: SessionState,
    last_seen: Instant,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            state: SessionState::default(),
            last_seen: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Store the next state and mark the slot as recently used.
    pub fn commit(&mut self, next: SessionState) {
        self.state = next;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.elapsed()
    }
}

/// Sender → slot table.
pub struct SessionStore {
    slots: RwLock<HashMap<SenderId, Arc<Mutex<SessionSlot>>>>,
    capacity: usize,
}

impl SessionStore {
    /// Create a store holding at most `capacity` senders (minimum 1).
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        })
    }

    /// Lock the sender's slot, creating an `Idle` one on first contact.
    ///
    /// Waits while another event for the same sender holds the slot.
    pub async fn lock(&self, sender: SenderId) -> OwnedMutexGuard<SessionSlot> {
        let slot = self.slot(sender).await;
        self.lock_resolved(sender, slot).await
    }

    /// Lock `slot`, retrying with a fresh lookup if it was pruned or evicted
    /// between the lookup and the lock.
    async fn lock_resolved(
        &self,
        sender: SenderId,
        mut slot: Arc<Mutex<SessionSlot>>,
    ) -> OwnedMutexGuard<SessionSlot> {
        loop {
            let guard = Arc::clone(&slot).lock_owned().await;
            let live = self
                .slots
                .read()
                .await
                .get(&sender)
                .is_some_and(|current| Arc::ptr_eq(current, &slot));
            if live {
                return guard;
            }
            drop(guard);
            debug!(sender = %sender, "Session slot was dropped before locking; retrying");
            slot = self.slot(sender).await;
        }
    }

    /// Get the sender's slot, creating an `Idle` one on first contact.
    async fn slot(&self, sender: SenderId) -> Arc<Mutex<SessionSlot>> {
        if let Some(slot) = self.slots.read().await.get(&sender) {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get(&sender) {
            return Arc::clone(slot);
        }

        if slots.len() >= self.capacity {
            evict_least_recent(&mut slots);
        }

        debug!(sender = %sender, "New session");
        let slot = Arc::new(Mutex::new(SessionSlot::new()));
        slots.insert(sender, Arc::clone(&slot));
        slot
    }

    /// Current state for a sender without creating a slot.
    pub async fn state(&self, sender: SenderId) -> SessionState {
        let slot = self.slots.read().await.get(&sender).cloned();
        match slot {
            Some(slot) => slot.lock().await.state(),
            None => SessionState::default(),
        }
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    /// Drop slots untouched for at least `idle_timeout`. Slots currently
    /// locked by an in-flight event are kept. Returns how many were removed.
    pub async fn prune_idle(&self, idle_timeout: Duration) -> usize {
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, slot| match slot.try_lock() {
            Ok(guard) => guard.idle_for() < idle_timeout,
            Err(_) => true,
        });
        let removed = before - slots.len();
        if removed > 0 {
            info!(removed, remaining = slots.len(), "Pruned idle sessions");
        }
        removed
    }
}

/// Remove the least recently seen slot that is not in use.
fn evict_least_recent(slots: &mut HashMap<SenderId, Arc<Mutex<SessionSlot>>>) {
    let oldest = slots
        .iter()
        .filter_map(|(sender, slot)| {
            slot.try_lock()
                .ok()
                .map(|guard| (*sender, guard.last_seen))
        })
        .min_by_key(|(_, last_seen)| *last_seen)
        .map(|(sender, _)| sender);

    match oldest {
        Some(sender) => {
            slots.remove(&sender);
            debug!(sender = %sender, "Evicted least recently seen session");
        }
        None => warn!(
            len = slots.len(),
            "Session table full and every slot busy; growing past capacity"
        ),
    }
}

/// Spawn a background task that prunes idle sessions every `interval`.
pub fn spawn_pruning_task(
    store: Arc<SessionStore>,
    idle_timeout: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.tick().await; // Skip immediate first tick
        loop {
            tick.tick().await;
            store.prune_idle(idle_timeout).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_sender_starts_idle() {
        let store = SessionStore::new(10);
        assert_eq!(store.state(SenderId(1)).await, SessionState::Idle);
        assert!(store.is_empty().await);

        let slot = store.slot(SenderId(1)).await;
        assert_eq!(slot.lock().await.state(), SessionState::Idle);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn same_sender_gets_same_slot() {
        let store = SessionStore::new(10);
        let a = store.slot(SenderId(1)).await;
        let b = store.slot(SenderId(1)).await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn senders_are_independent() {
        let store = SessionStore::new(10);
        store
            .slot(SenderId(1))
            .await
            .lock()
            .await
            .commit(SessionState::AwaitingIndexInput);

        assert_eq!(store.state(SenderId(1)).await, SessionState::AwaitingIndexInput);
        assert_eq!(store.state(SenderId(2)).await, SessionState::Idle);
    }

    #[tokio::test]
    async fn locked_sender_does_not_block_others() {
        let store = SessionStore::new(10);
        let slot_a = store.slot(SenderId(1)).await;
        let _held = slot_a.lock().await;

        let slot_b = store.slot(SenderId(2)).await;
        let guard = tokio::time::timeout(Duration::from_millis(100), slot_b.lock())
            .await
            .expect("other sender must not wait");
        assert_eq!(guard.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn prune_removes_idle_slots() {
        let store = SessionStore::new(10);
        store.slot(SenderId(1)).await;
        store.slot(SenderId(2)).await;

        assert_eq!(store.prune_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(store.prune_idle(Duration::ZERO).await, 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn prune_keeps_busy_slots() {
        let store = SessionStore::new(10);
        let busy = store.slot(SenderId(1)).await;
        store.slot(SenderId(2)).await;

        let _guard = busy.lock().await;
        assert_eq!(store.prune_idle(Duration::ZERO).await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_seen() {
        let store = SessionStore::new(2);
        store.slot(SenderId(1)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.slot(SenderId(2)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.slot(SenderId(1)).await.lock().await.touch();

        store.slot(SenderId(3)).await;

        let slots = store.slots.read().await;
        assert_eq!(slots.len(), 2);
        assert!(slots.contains_key(&SenderId(1)));
        assert!(!slots.contains_key(&SenderId(2)));
        assert!(slots.contains_key(&SenderId(3)));
    }

    #[tokio::test]
    async fn lock_survives_prune_between_lookup_and_lock() {
        let store = SessionStore::new(10);
        let stale = store.slot(SenderId(1)).await;
        assert_eq!(store.prune_idle(Duration::ZERO).await, 1);

        let mut guard = store.lock_resolved(SenderId(1), stale).await;
        guard.commit(SessionState::AwaitingIndexInput);
        drop(guard);

        assert_eq!(store.state(SenderId(1)).await, SessionState::AwaitingIndexInput);
    }

    #[tokio::test]
    async fn lock_survives_eviction_between_lookup_and_lock() {
        let store = SessionStore::new(1);
        let stale = store.slot(SenderId(1)).await;
        store.slot(SenderId(2)).await; // evicts sender 1

        let _held = store.lock_resolved(SenderId(1), stale).await;

        // A second event for the same sender must wait for the first.
        let second = tokio::time::timeout(Duration::from_millis(50), store.lock(SenderId(1))).await;
        assert!(second.is_err(), "two events for one sender held the lock at once");
    }

    #[tokio::test]
    async fn lock_serializes_same_sender() {
        let store = SessionStore::new(10);
        let first = store.lock(SenderId(1)).await;

        let waiting = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.lock(SenderId(1)).await.state() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(first);
        let state = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("lock not released")
            .unwrap();
        assert_eq!(state, SessionState::Idle);
    }

    #[tokio::test]
    async fn capacity_never_evicts_busy_slot() {
        let store = SessionStore::new(1);
        let busy = store.slot(SenderId(1)).await;
        let _guard = busy.lock().await;

        store.slot(SenderId(2)).await;
        assert_eq!(store.len().await, 2);
    }
}
