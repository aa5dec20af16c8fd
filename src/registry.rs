//! Per-camera registry shared by the frame hub and the diagnostics engine.
//!
//! The key set lives behind an `ArcSwap` and is replaced copy-on-write when a
//! camera registers. Lookups are wait-free and never contend with each other;
//! all per-camera mutation happens inside the values themselves.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::capture::CameraId;

pub(crate) type Entries<V> = BTreeMap<CameraId, Arc<V>>;

pub(crate) struct Registry<V> {
    entries: ArcSwap<Entries<V>>,
}

impl<V> Registry<V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(BTreeMap::new()),
        }
    }

    pub(crate) fn get(&self, id: &CameraId) -> Option<Arc<V>> {
        self.entries.load().get(id).cloned()
    }

    /// Returns the entry for `id`, inserting `init()` if absent. Concurrent
    /// callers racing on the same key all receive the single winning entry.
    pub(crate) fn get_or_insert_with(&self, id: &CameraId, init: impl FnOnce() -> V) -> Arc<V> {
        if let Some(existing) = self.get(id) {
            return existing;
        }

        let fresh = Arc::new(init());
        let mut winner = Arc::clone(&fresh);
        self.entries.rcu(|current| match current.get(id) {
            Some(existing) => {
                winner = Arc::clone(existing);
                Arc::clone(current)
            }
            None => {
                winner = Arc::clone(&fresh);
                let mut next = BTreeMap::clone(current);
                next.insert(id.clone(), Arc::clone(&fresh));
                Arc::new(next)
            }
        });
        winner
    }

    /// Point-in-time view of every entry, ordered by camera id
    pub(crate) fn entries(&self) -> Arc<Entries<V>> {
        self.entries.load_full()
    }

    pub(crate) fn ids(&self) -> Vec<CameraId> {
        self.entries.load().keys().cloned().collect()
    }
}
