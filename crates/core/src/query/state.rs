//! Query state and the reducer that advances it.
//!
//! The JSON shape (camelCase, every field optional on decode) is what gets
//! stored in the `query_state` column.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether a query has produced data yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    #[default]
    Pending,
    Error,
    Success,
}

/// Whether a fetch is currently in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Fetching,
    Paused,
    #[default]
    Idle,
}

/// Cached result and metadata of a single query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryState {
    pub data: Option<Value>,
    pub data_update_count: u64,
    /// Unix milliseconds of the last successful fetch, 0 if never.
    pub data_updated_at: i64,
    pub error: Option<Value>,
    pub error_update_count: u64,
    pub error_updated_at: i64,
    pub fetch_failure_count: u64,
    pub fetch_failure_reason: Option<Value>,
    pub fetch_meta: Option<Value>,
    pub is_invalidated: bool,
    pub status: QueryStatus,
    pub fetch_status: FetchStatus,
}

/// State transitions applied by the cache layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Fetch { meta: Option<Value> },
    /// `updated_at` defaults to the current time.
    Success { data: Value, updated_at: Option<i64> },
    Error { error: Value },
    Pause,
    Continue,
    Invalidate,
    SetState(QueryState),
}

impl QueryState {
    /// Apply `action`, producing the next state.
    pub fn reduce(mut self, action: Action) -> Self {
        match action {
            Action::Fetch { meta } => {
                self.fetch_status = FetchStatus::Fetching;
                self.fetch_meta = meta;
                self.fetch_failure_count = 0;
                self.fetch_failure_reason = None;
                if self.data_updated_at == 0 {
                    self.error = None;
                    self.status = QueryStatus::Pending;
                }
            }
            Action::Success { data, updated_at } => {
                self.data = Some(data);
                self.data_update_count += 1;
                self.data_updated_at = updated_at.unwrap_or_else(now_millis);
                self.error = None;
                self.is_invalidated = false;
                self.status = QueryStatus::Success;
                self.fetch_status = FetchStatus::Idle;
                self.fetch_failure_count = 0;
                self.fetch_failure_reason = None;
            }
            Action::Error { error } => {
                self.fetch_failure_count += 1;
                self.fetch_failure_reason = Some(error.clone());
                self.error = Some(error);
                self.error_update_count += 1;
                self.error_updated_at = now_millis();
                self.status = QueryStatus::Error;
                self.fetch_status = FetchStatus::Idle;
            }
            Action::Pause => self.fetch_status = FetchStatus::Paused,
            Action::Continue => self.fetch_status = FetchStatus::Fetching,
            Action::Invalidate => self.is_invalidated = true,
            Action::SetState(state) => return state,
        }
        self
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
