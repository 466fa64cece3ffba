//! Callback registry backing `subscribe(cb) -> Subscription`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub(crate) struct ListenerSet<T> {
    next_id: AtomicU64,
    callbacks: Mutex<BTreeMap<u64, Callback<T>>>,
}

impl<T: 'static> ListenerSet<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            callbacks: Mutex::new(BTreeMap::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Callback<T>>> {
        self.callbacks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, Arc::new(callback));
        let weak: Weak<Self> = Arc::downgrade(self);
        Subscription { id, registry: weak }
    }

    /// Invoke every registered callback, in subscription order. The registry
    /// lock is released before callbacks run, so a callback may subscribe or
    /// unsubscribe without deadlocking.
    pub(crate) fn notify(&self, value: &T) -> usize {
        let callbacks: Vec<Callback<T>> = self.lock().values().cloned().collect();
        for callback in &callbacks {
            callback(value);
        }
        callbacks.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64) -> bool;
}

impl<T: 'static> Detach for ListenerSet<T> {
    fn detach(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }
}

/// Handle returned by `subscribe`. Dropping it keeps the callback
/// registered; call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: u64,
    registry: Weak<dyn Detach>,
}

impl Subscription {
    /// Remove the callback. Returns false if it was already gone or the
    /// owning component no longer exists.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.detach(self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn notify_reaches_every_subscriber_until_unsubscribed() {
        let set = ListenerSet::<u32>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = hits.clone();
        let first = set.subscribe(move |v| {
            h1.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let h2 = hits.clone();
        let _second = set.subscribe(move |v| {
            h2.fetch_add(*v as usize, Ordering::SeqCst);
        });

        assert_eq!(set.notify(&2), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 4);

        assert!(first.unsubscribe());
        assert_eq!(set.notify(&1), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn unsubscribe_after_owner_dropped_is_harmless() {
        let set = ListenerSet::<u32>::new();
        let sub = set.subscribe(|_| {});
        drop(set);
        assert!(!sub.unsubscribe());
    }
}
