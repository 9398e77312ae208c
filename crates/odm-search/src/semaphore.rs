//! FIFO-fair bounded concurrency primitive
//!
//! A [`Semaphore`] grants at most `capacity` concurrent [`Permit`]s. When
//! none are free, acquirers queue in arrival order. A released permit is
//! handed directly to the oldest queued waiter through its confirmation
//! channel, so freed capacity is never left unconsumed while waiters exist.
//!
//! # Invariant
//! `free + held == capacity` after every operation.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{trace, warn};

struct Waiter {
    id: u64,
    tag: Option<String>,
    confirm: oneshot::Sender<()>,
}

struct State {
    capacity: usize,
    free: usize,
    waiting: VecDeque<Waiter>,
    held: IndexMap<u64, Option<String>>,
    next_id: u64,
}

impl State {
    fn check(&self) {
        debug_assert_eq!(self.free + self.held.len(), self.capacity);
    }

    fn grant(&mut self, id: u64, tag: Option<String>) {
        self.free -= 1;
        self.held.insert(id, tag);
    }
}

/// Fixed-capacity lock pool with FIFO hand-off
pub struct Semaphore {
    state: Mutex<State>,
}

impl Semaphore {
    /// Semaphore with `capacity` permits (at least one)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                capacity,
                free: capacity,
                waiting: VecDeque::new(),
                held: IndexMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Shared semaphore, the form [`Semaphore::acquire`] needs
    #[must_use]
    pub fn shared(capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(capacity))
    }

    /// Acquire a permit, waiting behind earlier acquirers if none is free
    ///
    /// Never fails. Dropping the returned future before it completes gives
    /// up the place in the queue, or returns capacity already handed over.
    pub async fn acquire(self: &Arc<Self>, tag: Option<&str>) -> Permit {
        let (id, confirmed) = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;

            if state.free > 0 {
                state.grant(id, tag.map(str::to_owned));
                state.check();
                return self.permit(id);
            }

            let (confirm, confirmed) = oneshot::channel();
            state.waiting.push_back(Waiter {
                id,
                tag: tag.map(str::to_owned),
                confirm,
            });
            trace!(id, waiting = state.waiting.len(), "semaphore acquire queued");
            (id, confirmed)
        };

        let mut pending = PendingAcquire {
            semaphore: self.as_ref(),
            id,
            settled: false,
        };
        // Confirmation is only sent after capacity moved to this id. A
        // waiter is never dropped without sending except by this guard.
        let confirmation = confirmed.await;
        debug_assert!(confirmation.is_ok(), "waiter {id} dropped without a grant");
        if confirmation.is_err() {
            warn!(id, "semaphore waiter dropped without a grant");
        }
        pending.settled = true;
        self.permit(id)
    }

    /// Acquire a permit only if one is free right now
    ///
    /// Never jumps the queue: returns `None` while others are waiting.
    #[must_use]
    pub fn try_acquire(self: &Arc<Self>, tag: Option<&str>) -> Option<Permit> {
        let mut state = self.state.lock();
        if state.free == 0 || !state.waiting.is_empty() {
            return None;
        }
        let id = state.next_id;
        state.next_id += 1;
        state.grant(id, tag.map(str::to_owned));
        state.check();
        Some(self.permit(id))
    }

    fn permit(self: &Arc<Self>, id: u64) -> Permit {
        Permit {
            semaphore: Arc::clone(self),
            id,
        }
    }

    fn release(&self, id: u64) {
        let mut state = self.state.lock();
        if state.held.shift_remove(&id).is_none() {
            return;
        }
        state.free += 1;

        while let Some(waiter) = state.waiting.pop_front() {
            state.grant(waiter.id, waiter.tag);
            if waiter.confirm.send(()).is_ok() {
                trace!(from = id, to = waiter.id, "semaphore hand-off");
                break;
            }
            // Receiver vanished without its guard running; take it back
            state.held.shift_remove(&waiter.id);
            state.free += 1;
        }
        state.check();
    }

    fn abandon(&self, id: u64) {
        let mut state = self.state.lock();
        if let Some(pos) = state.waiting.iter().position(|w| w.id == id) {
            state.waiting.remove(pos);
            trace!(id, "semaphore acquire abandoned while queued");
            return;
        }
        drop(state);
        // Capacity was handed over but never used
        self.release(id);
    }

    /// Total permits
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Permits free right now
    #[must_use]
    pub fn available(&self) -> usize {
        self.state.lock().free
    }

    /// Permits currently held
    #[must_use]
    pub fn held(&self) -> usize {
        self.state.lock().held.len()
    }

    /// Acquirers queued
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.state.lock().waiting.len()
    }

    /// Tags of held permits in grant order
    #[must_use]
    pub fn held_tags(&self) -> Vec<Option<String>> {
        self.state.lock().held.values().cloned().collect()
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Semaphore")
            .field("capacity", &state.capacity)
            .field("free", &state.free)
            .field("held", &state.held.len())
            .field("waiting", &state.waiting.len())
            .finish()
    }
}

struct PendingAcquire<'a> {
    semaphore: &'a Semaphore,
    id: u64,
    settled: bool,
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.semaphore.abandon(self.id);
        }
    }
}

/// Held capacity; released on drop
#[must_use = "capacity is released as soon as the permit is dropped"]
pub struct Permit {
    semaphore: Arc<Semaphore>,
    id: u64,
}

impl Permit {
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Release explicitly
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.semaphore.release(self.id);
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn immediate_acquire_when_free() {
        let semaphore = Semaphore::shared(2);
        let a = semaphore.acquire(Some("a")).await;
        let _b = semaphore.acquire(None).await;

        assert_eq!(semaphore.available(), 0);
        assert_eq!(semaphore.held(), 2);
        assert_eq!(semaphore.held_tags(), vec![Some("a".to_string()), None]);

        drop(a);
        assert_eq!(semaphore.available(), 1);
    }

    #[tokio::test]
    async fn release_hands_capacity_to_oldest_waiter() {
        let semaphore = Semaphore::shared(1);
        let first = semaphore.acquire(Some("first")).await;

        let waiter = {
            let semaphore = Arc::clone(&semaphore);
            tokio::spawn(async move {
                let _permit = semaphore.acquire(Some("second")).await;
                semaphore.held_tags()
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(semaphore.waiting(), 1);

        drop(first);
        // Handed over, not left free
        assert_eq!(semaphore.available(), 0);
        assert_eq!(semaphore.waiting(), 0);

        let tags = waiter.await.unwrap();
        assert_eq!(tags, vec![Some("second".to_string())]);
        assert_eq!(semaphore.available(), 1);
    }

    #[tokio::test]
    async fn try_acquire_respects_queue() {
        let semaphore = Semaphore::shared(1);
        let held = semaphore.try_acquire(None).unwrap();
        assert!(semaphore.try_acquire(None).is_none());
        held.release();
        assert!(semaphore.try_acquire(None).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_acquire_leaves_the_queue() {
        let semaphore = Semaphore::shared(1);
        let held = semaphore.acquire(None).await;

        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), semaphore.acquire(Some("late"))).await;
        assert!(timed_out.is_err());
        assert_eq!(semaphore.waiting(), 0);

        drop(held);
        assert_eq!(semaphore.available(), 1);
        assert_eq!(semaphore.held(), 0);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(Semaphore::new(0).capacity(), 1);
    }
}
