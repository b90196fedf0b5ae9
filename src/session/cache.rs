//! Per-session query cache.

use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

/// Cached backend responses, keyed by the session that fetched them.
///
/// Entries for a session are dropped on logout so a later session on the
/// same device never reads the previous user's data.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: DashMap<(Uuid, String), Value>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session: Uuid, key: &str) -> Option<Value> {
        self.entries
            .get(&(session, key.to_string()))
            .map(|r| r.value().clone())
    }

    pub fn insert(&self, session: Uuid, key: &str, value: Value) {
        self.entries.insert((session, key.to_string()), value);
    }

    /// Drop every entry belonging to `session`.
    pub fn clear_session(&self, session: Uuid) {
        self.entries.retain(|(owner, _), _| *owner != session);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
