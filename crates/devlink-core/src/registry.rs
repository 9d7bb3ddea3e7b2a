// ── Entity listener registry ──
//
// Concurrent EntityKey -> listener mapping. Entity handlers attach and
// detach from any task while the receive loop looks listeners up; a
// lookup clones the listener `Arc` and drops the shard guard before the
// listener runs, so a slow listener never blocks `register`.

use std::sync::Arc;

use dashmap::DashMap;
#[cfg(debug_assertions)]
use tracing::warn;
use tracing::debug;

use crate::model::{EntityKey, Event};

/// Per-entity handler invoked with every event routed to its key.
///
/// Runs on the receive loop: keep it fast and hand heavy work off to
/// another task.
pub trait EntityListener<P>: Send + Sync {
    fn on_event(&self, event: &Event<P>);
}

impl<P, F> EntityListener<P> for F
where
    F: Fn(&Event<P>) + Send + Sync,
{
    fn on_event(&self, event: &Event<P>) {
        self(event);
    }
}

/// Mapping from entity key to its listener. At most one listener per key.
pub struct Registry<P> {
    listeners: DashMap<EntityKey, Arc<dyn EntityListener<P>>>,
}

impl<P: 'static> Default for Registry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: 'static> Registry<P> {
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
        }
    }

    /// Attach `listener` to `key`, returning the listener it replaced.
    ///
    /// Last write wins; a replacement is logged as a conflict in debug
    /// builds.
    pub fn register(
        &self,
        key: EntityKey,
        listener: Arc<dyn EntityListener<P>>,
    ) -> Option<Arc<dyn EntityListener<P>>> {
        #[cfg(debug_assertions)]
        let conflict_key = key.clone();

        let previous = self.listeners.insert(key, listener);

        #[cfg(debug_assertions)]
        if previous.is_some() {
            warn!(key = %conflict_key, "listener replaced an existing registration");
        }

        previous
    }

    /// Detach whatever listener is registered for `key`.
    pub fn unregister(&self, key: &EntityKey) -> Option<Arc<dyn EntityListener<P>>> {
        let removed = self.listeners.remove(key).map(|(_, listener)| listener);
        if removed.is_some() {
            debug!(%key, "listener unregistered");
        }
        removed
    }

    pub fn lookup(&self, key: &EntityKey) -> Option<Arc<dyn EntityListener<P>>> {
        self.listeners.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.listeners.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<EntityKey> {
        let mut keys: Vec<EntityKey> = self.listeners.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}
