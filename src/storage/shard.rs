//! Member-local key-value store.
//!
//! A `Shard` belongs to exactly one ring member. Writes take the exclusive side of
//! the lock, reads share it, and the handover helpers move whole ranges in one
//! critical section so a key never sits half-moved.
//!
//! While a member waits for its handover it journals deletes, so entries that
//! arrive late cannot bring a deleted key back.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::identity::space::{Identifier, in_interval};

#[derive(Debug, Default)]
struct ShardState {
    entries: HashMap<Identifier, String>,
    /// Keys deleted since `track_deletes`; `None` when not journaling.
    deleted: Option<HashSet<Identifier>>,
}

#[derive(Debug, Default)]
pub struct Shard {
    state: RwLock<ShardState>,
}

impl Shard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: Identifier) -> Option<String> {
        self.state.read().await.entries.get(&key).cloned()
    }

    /// Inserts or overwrites; returns the previous value.
    pub async fn put(&self, key: Identifier, value: String) -> Option<String> {
        let mut state = self.state.write().await;
        if let Some(deleted) = state.deleted.as_mut() {
            deleted.remove(&key);
        }
        state.entries.insert(key, value)
    }

    pub async fn delete(&self, key: Identifier) -> Option<String> {
        let mut state = self.state.write().await;
        if let Some(deleted) = state.deleted.as_mut() {
            deleted.insert(key);
        }
        state.entries.remove(&key)
    }

    pub async fn keys(&self) -> HashSet<Identifier> {
        self.state.read().await.entries.keys().copied().collect()
    }

    /// Values ordered by key so listings are stable.
    pub async fn all_values(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut pairs: Vec<(&Identifier, &String)> = state.entries.iter().collect();
        pairs.sort_by_key(|(k, _)| **k);
        pairs.into_iter().map(|(_, v)| v.clone()).collect()
    }

    /// Snapshot of every entry, ordered by key.
    pub async fn entries(&self) -> Vec<(Identifier, String)> {
        let mut pairs: Vec<(Identifier, String)> = self
            .state
            .read()
            .await
            .entries
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        pairs.sort_by_key(|(k, _)| *k);
        pairs
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Removes and returns every entry whose key lies in `(from, to]`.
    pub async fn take_range(&self, from: Identifier, to: Identifier) -> Vec<(Identifier, String)> {
        let mut state = self.state.write().await;
        let keys: Vec<Identifier> = state
            .entries
            .keys()
            .filter(|k| in_interval(**k, from, to))
            .copied()
            .collect();
        let mut taken: Vec<(Identifier, String)> = keys
            .into_iter()
            .filter_map(|k| state.entries.remove(&k).map(|v| (k, v)))
            .collect();
        taken.sort_by_key(|(k, _)| *k);
        taken
    }

    /// Removes and returns everything.
    pub async fn drain(&self) -> Vec<(Identifier, String)> {
        let mut taken: Vec<(Identifier, String)> =
            self.state.write().await.entries.drain().collect();
        taken.sort_by_key(|(k, _)| *k);
        taken
    }

    /// Merges `incoming`, overwriting existing keys.
    pub async fn put_all(&self, incoming: Vec<(Identifier, String)>) {
        let mut state = self.state.write().await;
        for (key, value) in incoming {
            state.entries.insert(key, value);
        }
    }

    /// Merges `incoming`, keeping values already present. Returns how many were added.
    pub async fn put_missing(&self, incoming: Vec<(Identifier, String)>) -> usize {
        let mut state = self.state.write().await;
        let mut added = 0;
        for (key, value) in incoming {
            if let Entry::Vacant(slot) = state.entries.entry(key) {
                slot.insert(value);
                added += 1;
            }
        }
        added
    }

    /// Removes each key whose current value still equals the given one.
    /// Returns how many were removed.
    pub async fn retract(&self, stale: Vec<(Identifier, String)>) -> usize {
        let mut state = self.state.write().await;
        let mut removed = 0;
        for (key, value) in stale {
            if state.entries.get(&key) == Some(&value) {
                state.entries.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    /// Starts journaling deletes, discarding any earlier journal.
    pub async fn track_deletes(&self) {
        self.state.write().await.deleted = Some(HashSet::new());
    }

    /// Stops journaling deletes.
    pub async fn stop_tracking(&self) {
        self.state.write().await.deleted = None;
    }

    /// Merges handed-over entries and stops journaling deletes.
    ///
    /// Entries for keys already present, or deleted since `track_deletes`, are
    /// dropped. Returns how many were added.
    pub async fn settle_handover(&self, incoming: Vec<(Identifier, String)>) -> usize {
        let mut state = self.state.write().await;
        let deleted = state.deleted.take().unwrap_or_default();
        let mut added = 0;
        for (key, value) in incoming {
            if deleted.contains(&key) {
                continue;
            }
            if let Entry::Vacant(slot) = state.entries.entry(key) {
                slot.insert(value);
                added += 1;
            }
        }
        added
    }
}
