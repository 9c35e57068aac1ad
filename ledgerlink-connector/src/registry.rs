//! # Subscription Registry
//!
//! The set of active listener registrations, shared between callers (who add
//! and remove listeners from any task) and the dispatcher (which reads a
//! snapshot per event).
//!
//! Handles are allocated from a monotonically increasing counter, so sorting a
//! snapshot by handle restores registration order.

use crate::listener::{ListenerHandle, TransactionListener};
use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

#[derive(Default)]
pub struct SubscriptionRegistry {
    listeners: DashMap<ListenerHandle, Arc<dyn TransactionListener>>,
    next_handle: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener. Every dispatch that begins after this returns will
    /// invoke it.
    pub fn register(&self, listener: Arc<dyn TransactionListener>) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(handle, listener);
        tracing::info!(%handle, "Registered transaction listener");
        handle
    }

    /// Removes a registration. No dispatch that begins after this returns will
    /// invoke it; a dispatch already running may still do so once.
    ///
    /// Returns `false` if the handle was not registered.
    pub fn unregister(&self, handle: ListenerHandle) -> bool {
        let removed = self.listeners.remove(&handle).is_some();
        if removed {
            tracing::info!(%handle, "Unregistered transaction listener");
        } else {
            tracing::debug!(%handle, "Attempted to unregister an unknown listener");
        }
        removed
    }

    /// The current registrations in registration order.
    pub fn snapshot(&self) -> Vec<(ListenerHandle, Arc<dyn TransactionListener>)> {
        let mut entries: Vec<_> = self
            .listeners
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        entries.sort_unstable_by_key(|(handle, _)| *handle);
        entries
    }

    pub fn contains(&self, handle: ListenerHandle) -> bool {
        self.listeners.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ListenerError, transaction::Transaction};
    use std::thread;

    fn noop() -> Arc<dyn TransactionListener> {
        Arc::new(|_: &Transaction| -> Result<(), ListenerError> { Ok(()) })
    }

    #[test]
    fn same_listener_registered_twice_gets_two_handles() {
        let registry = SubscriptionRegistry::new();
        let listener = noop();

        let first = registry.register(listener.clone());
        let second = registry.register(listener);

        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);

        assert!(registry.unregister(first));
        assert!(!registry.contains(first));
        assert!(registry.contains(second));
        assert!(!registry.unregister(first));
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let registry = SubscriptionRegistry::new();
        let handles: Vec<_> = (0..50).map(|_| registry.register(noop())).collect();
        registry.unregister(handles[10]);
        registry.unregister(handles[30]);

        let snapshot: Vec<_> = registry.snapshot().into_iter().map(|(h, _)| h).collect();
        let expected: Vec<_> = handles
            .iter()
            .copied()
            .filter(|h| *h != handles[10] && *h != handles[30])
            .collect();
        assert_eq!(snapshot, expected);
    }

    #[test]
    fn concurrent_registrations_are_all_visible() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let mine: Vec<_> = (0..100).map(|_| registry.register(noop())).collect();
                    for handle in mine.iter().step_by(2) {
                        assert!(registry.unregister(*handle));
                    }
                    mine
                })
            })
            .collect();

        let mut kept = Vec::new();
        for worker in workers {
            let mine = worker.join().unwrap();
            kept.extend(mine.into_iter().skip(1).step_by(2));
        }
        kept.sort_unstable();

        let snapshot: Vec<_> = registry.snapshot().into_iter().map(|(h, _)| h).collect();
        assert_eq!(snapshot, kept);
        assert_eq!(registry.len(), 400);
    }
}
