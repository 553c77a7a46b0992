//! Per-backend state store
//!
//! A concurrent map from backend id to the most recently accepted count.
//! Entries are created lazily on first accepted report and never removed;
//! backends that go silent simply age out of the liveness window and come
//! back without re-initialization. Memory is bounded by the number of
//! distinct backend ids ever seen, a small config-known set.
//!
//! All mutation goes through [`CountStore::upsert`], which holds the entry
//! lock while it re-checks the ordering guard and overwrites the fields as
//! a unit. Readers of other entries are never blocked.

use crate::report::NormalizedCount;
use dashmap::DashMap;

/// Latest accepted state for one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendState {
    pub server_id: String,
    /// Wall-clock receipt time of the latest accepted report
    pub last_seen_ms: i64,
    /// The backend-claimed timestamp of that report; monotonically
    /// non-decreasing across accepted updates
    pub last_timestamp_ms: i64,
    pub online_humans: i32,
    pub online_ai: i32,
    pub online_total: i32,
    pub max_players_override: i32,
}

impl BackendState {
    fn from_count(count: &NormalizedCount) -> Self {
        Self {
            server_id: count.server_id.clone(),
            last_seen_ms: count.received_at_ms,
            last_timestamp_ms: count.timestamp_ms,
            online_humans: count.online_humans,
            online_ai: count.online_ai,
            online_total: count.online_total,
            max_players_override: count.max_players_override,
        }
    }
}

/// Concurrent mapping from backend id to its latest accepted state.
#[derive(Debug, Default)]
pub struct CountStore {
    states: DashMap<String, BackendState>,
}

impl CountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored backend-claimed timestamp for `server_id`, used by the
    /// validation pipeline's ordering pre-check. The authoritative check
    /// happens again inside [`upsert`](Self::upsert).
    pub fn last_timestamp_ms(&self, server_id: &str) -> Option<i64> {
        self.states
            .get(server_id)
            .map(|state| state.last_timestamp_ms)
    }

    /// Commits an accepted count, re-checking the ordering guard against
    /// the current stored timestamp under the entry lock. Two concurrent
    /// writers for one backend serialize here: if another writer raced
    /// ahead with a newer timestamp the candidate is discarded and this
    /// returns false (last-committed-wins, not last-validated-wins).
    /// Equal timestamps overwrite, making replays idempotent.
    pub fn upsert(&self, count: NormalizedCount) -> bool {
        match self.states.entry(count.server_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if count.timestamp_ms < entry.get().last_timestamp_ms {
                    return false;
                }
                entry.insert(BackendState::from_count(&count));
                true
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(BackendState::from_count(&count));
                true
            }
        }
    }

    /// Point-in-time copy of all entries for aggregation. Each entry is
    /// read under its own lock, so no torn per-entry state is observable;
    /// entries read early may be slightly staler than entries read late,
    /// which is acceptable since there is no cross-backend atomicity
    /// requirement.
    pub fn snapshot(&self) -> Vec<BackendState> {
        self.states.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn get(&self, server_id: &str) -> Option<BackendState> {
        self.states.get(server_id).map(|state| state.clone())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(server_id: &str, timestamp_ms: i64, total: i32) -> NormalizedCount {
        NormalizedCount {
            server_id: server_id.to_string(),
            timestamp_ms,
            online_humans: total,
            online_ai: 0,
            online_total: total,
            max_players_override: 0,
            received_at_ms: 5_000,
        }
    }

    #[test]
    fn first_report_creates_entry() {
        let store = CountStore::new();
        assert!(store.is_empty());
        assert!(store.upsert(count("lobby-1", 100, 7)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("lobby-1").unwrap().online_total, 7);
    }

    #[test]
    fn newer_timestamp_overwrites() {
        let store = CountStore::new();
        assert!(store.upsert(count("lobby-1", 100, 7)));
        assert!(store.upsert(count("lobby-1", 200, 9)));
        let state = store.get("lobby-1").unwrap();
        assert_eq!(state.last_timestamp_ms, 200);
        assert_eq!(state.online_total, 9);
    }

    #[test]
    fn older_timestamp_discarded() {
        let store = CountStore::new();
        assert!(store.upsert(count("lobby-1", 200, 9)));
        assert!(!store.upsert(count("lobby-1", 100, 7)));
        let state = store.get("lobby-1").unwrap();
        assert_eq!(state.last_timestamp_ms, 200);
        assert_eq!(state.online_total, 9);
    }

    #[test]
    fn equal_timestamp_is_idempotent() {
        let store = CountStore::new();
        assert!(store.upsert(count("lobby-1", 100, 7)));
        let before = store.get("lobby-1").unwrap();
        assert!(store.upsert(count("lobby-1", 100, 7)));
        assert_eq!(store.get("lobby-1").unwrap(), before);
    }

    #[test]
    fn entries_are_independent() {
        let store = CountStore::new();
        assert!(store.upsert(count("lobby-1", 100, 7)));
        assert!(store.upsert(count("survival", 50, 3)));
        assert_eq!(store.len(), 2);
        assert_eq!(store.last_timestamp_ms("lobby-1"), Some(100));
        assert_eq!(store.last_timestamp_ms("survival"), Some(50));
        assert_eq!(store.last_timestamp_ms("unknown"), None);
    }

    #[test]
    fn snapshot_copies_all_entries() {
        let store = CountStore::new();
        store.upsert(count("a", 1, 1));
        store.upsert(count("b", 2, 2));
        let mut snapshot = store.snapshot();
        snapshot.sort_by(|x, y| x.server_id.cmp(&y.server_id));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].server_id, "a");
        assert_eq!(snapshot[1].server_id, "b");
        // Mutating the store after the snapshot does not affect the copy.
        store.upsert(count("a", 3, 30));
        assert_eq!(snapshot[0].online_total, 1);
    }

    #[test]
    fn concurrent_writers_serialize_per_entry() {
        use std::sync::Arc;
        let store = Arc::new(CountStore::new());
        let mut handles = Vec::new();
        for timestamp in 0..50i64 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.upsert(count("lobby-1", timestamp, timestamp as i32));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        // Whatever the interleaving, the winner carries the largest
        // committed timestamp and its matching total.
        let state = store.get("lobby-1").unwrap();
        assert_eq!(state.online_total as i64, state.last_timestamp_ms);
    }
}
