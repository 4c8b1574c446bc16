//! Cache event listeners.
//!
//! Events raised while applying a notification batch are deferred and
//! flushed after every statement in the batch has been applied, in a fixed
//! order: the batch commit event first, then per-entry change events, then
//! lifecycle hooks for objects materialized during the batch.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::key::CacheKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Removed,
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub cache: String,
    pub kind: ChangeKind,
    pub key: CacheKey,
}

/// Observer of cache mutations. All methods default to no-ops so listeners
/// implement only what they care about.
pub trait CacheListener: Send + Sync {
    /// A notification batch committed. Fired once per batch, before any
    /// per-entry event, naming every cache the batch touched.
    fn on_commit(&self, _source: &str, _sequence: u64, _affected: &[String]) {}

    /// A single cache entry was inserted, updated, or removed.
    fn on_change(&self, _event: &ChangeEvent) {}

    /// A cache was invalidated wholesale and will bulk-reload on next read.
    fn on_invalidated(&self, _cache: &str) {}

    /// An object finished materializing, including reference resolution.
    fn on_loaded(&self, _cache: &str, _key: &CacheKey) {}
}

/// Shared listener registry. Caches and the router hold the same set so
/// read-path loads and notification batches reach the same observers.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn CacheListener>>>,
}

impl ListenerSet {
    pub fn new() -> Arc<ListenerSet> {
        Arc::new(ListenerSet::default())
    }

    pub fn register(&self, listener: Arc<dyn CacheListener>) {
        self.listeners.write().push(listener);
    }

    pub(crate) fn each(&self, mut f: impl FnMut(&dyn CacheListener)) {
        for l in self.listeners.read().iter() {
            f(l.as_ref());
        }
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.listeners.read().len())
            .finish()
    }
}

/// Events accumulated while a batch is applied, flushed once at the end.
#[derive(Default)]
pub(crate) struct PendingEvents {
    pub invalidated: Vec<String>,
    pub changes: Vec<ChangeEvent>,
    pub loaded: Vec<(String, CacheKey)>,
}

impl PendingEvents {
    pub fn flush(self, listeners: &ListenerSet, source: &str, sequence: u64, affected: &[String]) {
        listeners.each(|l| l.on_commit(source, sequence, affected));
        for cache in &self.invalidated {
            listeners.each(|l| l.on_invalidated(cache));
        }
        for ev in &self.changes {
            listeners.each(|l| l.on_change(ev));
        }
        for (cache, key) in &self.loaded {
            listeners.each(|l| l.on_loaded(cache, key));
        }
    }
}
