// crates/sqlgate-sqlite/src/gate.rs
// ============================================================================
// Module: Connection Gate
// Description: FIFO async mutual exclusion around a single shared resource.
// Purpose: Serialize async callers onto one synchronous database connection.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! [`ConnectionGate`] owns the single resource and hands it out through a
//! [`GateGuard`]. Waiters are served in arrival order; holding the guard is
//! the only way to reach the resource, and dropping it (or calling
//! [`GateGuard::release`]) passes ownership to the next waiter. A release
//! without a matching acquire cannot be expressed.
//!
//! There is no built-in timeout. Callers wanting a bounded wait race
//! [`ConnectionGate::acquire`] against their own timer; abandoning the wait is
//! safe and leaves the queue intact.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Async FIFO gate granting exclusive access to one resource.
///
/// # Invariants
/// - At most one [`GateGuard`] exists at any instant.
/// - Waiters acquire in the order they started waiting.
pub struct ConnectionGate<T> {
    /// Resource behind a fair (FIFO) async mutex.
    resource: Arc<Mutex<T>>,
    /// Number of callers currently suspended in `acquire`.
    waiters: Arc<AtomicUsize>,
}

impl<T> ConnectionGate<T> {
    /// Creates a gate around `resource`; the gate starts free.
    #[must_use]
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(Mutex::new(resource)),
            waiters: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Suspends until the caller is the sole holder.
    pub async fn acquire(&self) -> GateGuard<T> {
        let _waiting = WaiterSlot::enter(&self.waiters);
        let guard = Arc::clone(&self.resource).lock_owned().await;
        GateGuard {
            guard,
        }
    }

    /// Acquires immediately if the gate is free.
    #[must_use]
    pub fn try_acquire(&self) -> Option<GateGuard<T>> {
        Arc::clone(&self.resource).try_lock_owned().ok().map(|guard| GateGuard {
            guard,
        })
    }

    /// Returns true while some caller holds the gate.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.resource.try_lock().is_err()
    }

    /// Returns the number of callers waiting to acquire.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Exclusive hold on the gate's resource.
pub struct GateGuard<T> {
    /// Owned lock guard; dropping it wakes the next waiter.
    guard: OwnedMutexGuard<T>,
}

impl<T> GateGuard<T> {
    /// Releases the gate to the next waiter.
    pub fn release(self) {
        drop(self);
    }
}

impl<T> Deref for GateGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for GateGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// Waiter registration that unregisters on drop, including cancellation.
struct WaiterSlot<'a> {
    /// Shared waiter counter.
    counter: &'a AtomicUsize,
}

impl<'a> WaiterSlot<'a> {
    /// Registers one waiter.
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter,
        }
    }
}

impl Drop for WaiterSlot<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::ConnectionGate;

    #[tokio::test]
    async fn try_acquire_fails_while_held() {
        let gate = ConnectionGate::new(0_u32);
        let guard = gate.acquire().await;
        assert!(gate.is_held());
        assert!(gate.try_acquire().is_none());
        guard.release();
        assert!(!gate.is_held());
        assert!(gate.try_acquire().is_some());
    }

    #[tokio::test]
    async fn waiters_are_served_in_arrival_order() {
        let gate = Arc::new(ConnectionGate::new(Vec::<usize>::new()));
        let first = gate.acquire().await;
        let mut handles = Vec::new();
        for index in 0 .. 5 {
            let task_gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                let mut guard = task_gate.acquire().await;
                guard.push(index);
            }));
            while gate.waiters() < index + 1 {
                tokio::task::yield_now().await;
            }
        }
        first.release();
        for handle in handles {
            handle.await.unwrap();
        }
        let order = gate.acquire().await.clone();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn at_most_one_holder_at_a_time() {
        let gate = Arc::new(ConnectionGate::new(()));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0 .. 32 {
            let gate = Arc::clone(&gate);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let guard = gate.acquire().await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                guard.release();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(!gate.is_held());
    }

    #[tokio::test]
    async fn abandoned_wait_unregisters_waiter() {
        let gate = ConnectionGate::new(());
        let _held = gate.acquire().await;
        let attempt = tokio::time::timeout(Duration::from_millis(5), gate.acquire()).await;
        assert!(attempt.is_err());
        assert_eq!(gate.waiters(), 0);
    }
}
