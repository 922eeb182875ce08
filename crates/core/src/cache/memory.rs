//! Plain in-memory cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::{CacheEvent, QueryCache};
use crate::query::Query;

type Listener = dyn Fn(&CacheEvent) + Send + Sync;

/// Handle returned by [`MemoryQueryCache::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// Queries held in a map, with event fan-out to subscribers.
#[derive(Default)]
pub struct MemoryQueryCache {
    queries: RwLock<HashMap<String, Arc<Query>>>,
    listeners: RwLock<Vec<(ListenerId, Arc<Listener>)>>,
    next_listener: AtomicU64,
}

impl MemoryQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for every event this cache emits.
    pub fn subscribe(&self, listener: impl Fn(&CacheEvent) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.queries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueryCache for MemoryQueryCache {
    fn get(&self, hash: &str) -> Option<Arc<Query>> {
        self.queries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hash)
            .cloned()
    }

    fn get_all(&self) -> Vec<Arc<Query>> {
        self.queries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn add(&self, query: Arc<Query>) {
        let inserted = {
            let mut queries = self.queries.write().unwrap_or_else(PoisonError::into_inner);
            if queries.contains_key(query.hash()) {
                false
            } else {
                queries.insert(query.hash().to_string(), Arc::clone(&query));
                true
            }
        };
        if inserted {
            self.notify(&CacheEvent::Added(query));
        }
    }

    fn remove(&self, query: &Arc<Query>) {
        let removed = {
            let mut queries = self.queries.write().unwrap_or_else(PoisonError::into_inner);
            match queries.get(query.hash()) {
                Some(current) if Arc::ptr_eq(current, query) => queries.remove(query.hash()).is_some(),
                _ => false,
            }
        };
        if removed {
            self.notify(&CacheEvent::Removed(Arc::clone(query)));
        }
    }

    fn notify(&self, event: &CacheEvent) {
        let listeners: Vec<Arc<Listener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

impl fmt::Debug for MemoryQueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryQueryCache").field("queries", &self.len()).finish_non_exhaustive()
    }
}
