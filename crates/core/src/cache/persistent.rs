//! Cache decorator mirroring lifecycle events into a persister.

use std::sync::{Arc, Mutex, PoisonError};

use super::{CacheEvent, QueryCache};
use crate::persist::QueryCachePersister;
use crate::query::Query;

/// Wraps a base cache and forwards its lifecycle to a [`QueryCachePersister`].
///
/// - `add`: the persister runs first, so hydrated state is in place before
///   the base cache announces the entry.
/// - `remove`: the base cache runs first; the persisted row is deleted after.
/// - `notify`: forwarded to the base cache, then `Updated` and
///   `ObserverResultsUpdated` events are persisted.
///
/// Every other operation is delegated unchanged.
///
/// `add` and `remove` run one at a time, each holding a lock from the
/// tracking check through the persister and base-cache calls. Listeners of
/// the base cache run under that lock and must not add or remove entries.
#[derive(Debug)]
pub struct PersistentQueryCache<C, P> {
    inner: C,
    persister: P,
    lifecycle: Mutex<()>,
}

impl<C, P> PersistentQueryCache<C, P> {
    pub fn new(inner: C, persister: P) -> Self {
        Self { inner, persister, lifecycle: Mutex::new(()) }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn persister(&self) -> &P {
        &self.persister
    }
}

impl<C: QueryCache, P: QueryCachePersister> QueryCache for PersistentQueryCache<C, P> {
    fn get(&self, hash: &str) -> Option<Arc<Query>> {
        self.inner.get(hash)
    }

    fn get_all(&self) -> Vec<Arc<Query>> {
        self.inner.get_all()
    }

    fn add(&self, query: Arc<Query>) {
        let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        // Hydrate only entries the base cache does not track yet.
        if self.inner.get(query.hash()).is_none() {
            self.persister.add(&query);
        }
        self.inner.add(query);
    }

    fn remove(&self, query: &Arc<Query>) {
        let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        let tracked = self
            .inner
            .get(query.hash())
            .is_some_and(|current| Arc::ptr_eq(&current, query));
        self.inner.remove(query);
        if tracked {
            self.persister.removed(query);
        }
    }

    fn notify(&self, event: &CacheEvent) {
        self.inner.notify(event);
        match event {
            CacheEvent::Updated { query, .. } | CacheEvent::ObserverResultsUpdated(query) => {
                self.persister.updated(query);
            }
            _ => {}
        }
    }
}
