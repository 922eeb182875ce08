//! The in-memory query cache and its persistent decorator.
//!
//! [`QueryCache`] exposes the three extension points the persistence layer
//! hooks into (`add`, `remove`, `notify`). Its provided methods always call
//! back through `self`, so a wrapping implementation sees every add, removal
//! and notification, including those triggered by `build`, `dispatch` and
//! `clear`.

pub mod memory;
pub mod persistent;

use std::sync::Arc;

use serde_json::Value;

use crate::query::{Action, Query, QueryKey, compute_query_hash};

pub use memory::{ListenerId, MemoryQueryCache};
pub use persistent::PersistentQueryCache;

/// Notification emitted by the cache layer.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    Added(Arc<Query>),
    Removed(Arc<Query>),
    /// The query's state changed through `action`.
    Updated { query: Arc<Query>, action: Action },
    ObserverAdded(Arc<Query>),
    ObserverRemoved(Arc<Query>),
    /// An observer recomputed its result from the query's state.
    ObserverResultsUpdated(Arc<Query>),
    ObserverOptionsUpdated(Arc<Query>),
}

impl CacheEvent {
    pub fn query(&self) -> &Arc<Query> {
        match self {
            CacheEvent::Added(query)
            | CacheEvent::Removed(query)
            | CacheEvent::Updated { query, .. }
            | CacheEvent::ObserverAdded(query)
            | CacheEvent::ObserverRemoved(query)
            | CacheEvent::ObserverResultsUpdated(query)
            | CacheEvent::ObserverOptionsUpdated(query) => query,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CacheEvent::Added(_) => "added",
            CacheEvent::Removed(_) => "removed",
            CacheEvent::Updated { .. } => "updated",
            CacheEvent::ObserverAdded(_) => "observerAdded",
            CacheEvent::ObserverRemoved(_) => "observerRemoved",
            CacheEvent::ObserverResultsUpdated(_) => "observerResultsUpdated",
            CacheEvent::ObserverOptionsUpdated(_) => "observerOptionsUpdated",
        }
    }
}

/// A store of queries keyed by fingerprint.
pub trait QueryCache: Send + Sync {
    fn get(&self, hash: &str) -> Option<Arc<Query>>;

    fn get_all(&self) -> Vec<Arc<Query>>;

    /// Start tracking `query`. Ignored if its fingerprint is already tracked.
    fn add(&self, query: Arc<Query>);

    /// Stop tracking `query`. Ignored unless it is the tracked instance.
    fn remove(&self, query: &Arc<Query>);

    fn notify(&self, event: &CacheEvent);

    /// Look up the entry for `key`, creating it if absent.
    fn build(&self, key: QueryKey) -> Arc<Query> {
        let hash = compute_query_hash(&key);
        self.build_with_hash(key, hash)
    }

    /// Like [`QueryCache::build`] with a caller-supplied fingerprint.
    fn build_with_hash(&self, key: QueryKey, hash: String) -> Arc<Query> {
        if let Some(query) = self.get(&hash) {
            return query;
        }
        let query = Arc::new(Query::with_hash(key, hash));
        self.add(Arc::clone(&query));
        self.get(query.hash()).unwrap_or(query)
    }

    fn find(&self, key: &QueryKey) -> Option<Arc<Query>> {
        self.get(&compute_query_hash(key))
    }

    /// Apply `action` to `query` and announce the change.
    fn dispatch(&self, query: &Arc<Query>, action: Action) {
        query.apply(action.clone());
        self.notify(&CacheEvent::Updated { query: Arc::clone(query), action });
    }

    /// Store `data` as the successful result for `key`.
    fn set_query_data(&self, key: QueryKey, data: Value) -> Arc<Query> {
        let query = self.build(key);
        self.dispatch(&query, Action::Success { data, updated_at: None });
        query
    }

    /// Remove every tracked query.
    fn clear(&self) {
        for query in self.get_all() {
            self.remove(&query);
        }
    }
}
