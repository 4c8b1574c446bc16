//! Notification routing.
//!
//! The router owns the registered caches and replays committed DML batches
//! onto them: parse the batch, hand each statement to every cache watching
//! an affected table, then run the deferred reference passes and flush
//! events in a fixed order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use connpool::pool::ConnectionPool;
use sqlparse::parser::Parser;
use sqlrepr::resolve::SchemaResolver;
use tracing::{debug, error, warn};

use crate::cache::{Applied, DeferredRef, ObjectCache};
use crate::errors::Result;
use crate::events::{ListenerSet, PendingEvents};
use crate::key::CacheKey;
use crate::notification::ChangeNotification;

pub struct CacheRouter {
    caches: Vec<Arc<ObjectCache>>,
    pool: ConnectionPool,
    resolver: Arc<dyn SchemaResolver>,
    listeners: Arc<ListenerSet>,
}

impl CacheRouter {
    pub fn new(
        pool: ConnectionPool,
        resolver: Arc<dyn SchemaResolver>,
        listeners: Arc<ListenerSet>,
    ) -> CacheRouter {
        CacheRouter {
            caches: Vec::new(),
            pool,
            resolver,
            listeners,
        }
    }

    /// Register a cache. Registration order decides statement application
    /// order within a batch.
    pub fn register(&mut self, cache: Arc<ObjectCache>) {
        if self.caches.iter().any(|c| c.name() == cache.name()) {
            warn!(cache = cache.name(), "duplicate cache name registered");
        }
        debug!(cache = cache.name(), table = %cache.table(), "cache registered");
        self.caches.push(cache);
    }

    pub fn cache(&self, name: &str) -> Option<Arc<ObjectCache>> {
        self.caches.iter().find(|c| c.name() == name).cloned()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn listeners(&self) -> &Arc<ListenerSet> {
        &self.listeners
    }

    /// Apply one notification batch: a payload of newline-separated DML
    /// statements committed by `source`.
    ///
    /// Statements apply in payload order, to caches in registration order.
    /// Unparseable lines were already logged and dropped by the parser. An
    /// error aborts the rest of the batch; entries applied so far stay, and
    /// the caller is expected to escalate to a full refresh.
    pub async fn apply_batch(&self, source: &str, sequence: u64, payload: &str) -> Result<()> {
        let statements = Parser::parse_batch(payload, self.resolver.as_ref());
        if statements.is_empty() {
            return Ok(());
        }
        let notifications: Vec<ChangeNotification> = statements
            .into_iter()
            .map(|stmt| ChangeNotification::new(stmt, source, sequence))
            .collect();

        let mut affected: Vec<String> = Vec::new();
        let mut pending = PendingEvents::default();
        let mut deferred: Vec<(Arc<ObjectCache>, DeferredRef)> = Vec::new();

        for note in &notifications {
            for cache in &self.caches {
                if !note.statement.tables().iter().any(|t| cache.watches(t)) {
                    continue;
                }
                let applied = cache
                    .apply_notification(&note.statement, &self.pool)
                    .await
                    .inspect_err(|e| {
                        error!(
                            source,
                            cache = cache.name(),
                            statement = %note.statement,
                            error = %e,
                            "failed to apply notification"
                        );
                    })?;
                match applied {
                    Applied::Skipped => {}
                    Applied::Invalidated => {
                        push_affected(&mut affected, cache.name());
                        pending.invalidated.push(cache.name().to_string());
                    }
                    Applied::Rows {
                        deferred: refs,
                        changes,
                        loaded,
                    } => {
                        push_affected(&mut affected, cache.name());
                        deferred.extend(refs.into_iter().map(|r| (cache.clone(), r)));
                        pending.changes.extend(changes);
                        pending
                            .loaded
                            .extend(loaded.into_iter().map(|k| (cache.name().to_string(), k)));
                    }
                }
            }
        }

        self.resolve_deferred(deferred);
        if !affected.is_empty() {
            pending.flush(&self.listeners, source, sequence, &affected);
        }
        Ok(())
    }

    /// Run the deferred second passes, grouped by target entry. Groups run
    /// oldest-first; within a group the most recent reference for a column
    /// wins, so the group is walked newest-first and earlier references to
    /// an already-resolved column are dropped.
    fn resolve_deferred(&self, deferred: Vec<(Arc<ObjectCache>, DeferredRef)>) {
        let mut groups: Vec<Vec<(Arc<ObjectCache>, DeferredRef)>> = Vec::new();
        let mut index: HashMap<(String, CacheKey), usize> = HashMap::new();
        for (cache, d) in deferred {
            let group_key = (cache.name().to_string(), d.key.clone());
            let idx = *index.entry(group_key).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[idx].push((cache, d));
        }

        for group in groups {
            let mut resolved: HashSet<String> = HashSet::new();
            for (cache, d) in group.into_iter().rev() {
                if !resolved.insert(d.column.to_ascii_lowercase()) {
                    continue;
                }
                cache.resolve_ref(&d);
            }
        }
    }

    /// Invalidate every cache; each reloads lazily on its next read.
    pub fn refresh_all(&self) {
        warn!("refreshing all caches");
        for cache in &self.caches {
            cache.invalidate();
            self.listeners.each(|l| l.on_invalidated(cache.name()));
        }
    }
}

impl std::fmt::Debug for CacheRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRouter")
            .field("caches", &self.caches.len())
            .finish()
    }
}

fn push_affected(affected: &mut Vec<String>, name: &str) {
    if !affected.iter().any(|a| a == name) {
        affected.push(name.to_string());
    }
}
