//! Query entries held by the in-memory cache.

pub mod hash;
pub mod state;

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use hash::compute_query_hash;
pub use state::{Action, FetchStatus, QueryState, QueryStatus};

/// Identity of a query: an ordered list of JSON parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<Value>);

impl QueryKey {
    pub fn new(parts: impl IntoIterator<Item = Value>) -> Self {
        Self(parts.into_iter().collect())
    }

    pub fn parts(&self) -> &[Value] {
        &self.0
    }
}

impl From<&str> for QueryKey {
    fn from(part: &str) -> Self {
        Self(vec![Value::String(part.to_string())])
    }
}

/// A single cache entry.
///
/// The fingerprint is fixed at construction. State sits behind a lock so the
/// cache layer and persistence hooks can share the entry through an `Arc`.
#[derive(Debug)]
pub struct Query {
    key: QueryKey,
    hash: String,
    state: RwLock<QueryState>,
}

impl Query {
    /// New entry in the default state, fingerprinted with [`compute_query_hash`].
    pub fn new(key: QueryKey) -> Self {
        let hash = compute_query_hash(&key);
        Self::with_hash(key, hash)
    }

    /// New entry with a caller-supplied fingerprint.
    pub fn with_hash(key: QueryKey, hash: impl Into<String>) -> Self {
        Self { key, hash: hash.into(), state: RwLock::new(QueryState::default()) }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> QueryState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Overwrite the whole state.
    pub fn replace_state(&self, state: QueryState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Run `action` through the reducer.
    pub fn apply(&self, action: Action) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let current = std::mem::take(&mut *guard);
        *guard = current.reduce(action);
    }
}
