// src/action_log.rs
// Append-only record of deny-class decisions and manual rule changes.

use std::sync::{Arc, Mutex};

use rand::random;
use serde::{Deserialize, Serialize};

use crate::codes::{ReasonCode, RuleAction};
use crate::storage::{KeyValueStore, StoreError};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ActionLogEntry {
    pub ip: String,
    #[serde(default)]
    pub session_id: String,
    pub action_code: RuleAction,
    pub reason_code: ReasonCode,
    pub timestamp: u64,
}

pub trait ActionLogger {
    fn add(&self, entry: &ActionLogEntry) -> Result<(), StoreError>;
}

impl<T: ActionLogger + ?Sized> ActionLogger for Arc<T> {
    fn add(&self, entry: &ActionLogEntry) -> Result<(), StoreError> {
        (**self).add(entry)
    }
}

/// Writes each entry under its own immutable key so concurrent writers never
/// read-modify-write a shared list:
/// `<channel>:actionlog:<hour>:<ts>-<nonce>`.
pub struct KvActionLog<S> {
    store: S,
    channel: String,
}

impl<S: KeyValueStore> KvActionLog<S> {
    pub fn new(store: S, channel: impl Into<String>) -> Self {
        KvActionLog {
            store,
            channel: channel.into(),
        }
    }

    pub fn hour_prefix(&self, hour: u64) -> String {
        format!("{}:actionlog:{}:", self.channel, hour)
    }

    fn entry_key(&self, ts: u64) -> String {
        format!("{}{}-{:016x}", self.hour_prefix(ts / 3600), ts, random::<u64>())
    }
}

impl<S: KeyValueStore> ActionLogger for KvActionLog<S> {
    fn add(&self, entry: &ActionLogEntry) -> Result<(), StoreError> {
        let key = self.entry_key(entry.timestamp);
        let payload = serde_json::to_vec(entry).map_err(|e| StoreError::Encoding {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        self.store.set(&key, &payload)
    }
}

/// Keeps entries in process memory.
#[derive(Debug, Default)]
pub struct MemoryActionLog {
    entries: Mutex<Vec<ActionLogEntry>>,
}

impl MemoryActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ActionLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ActionLogger for MemoryActionLog {
    fn add(&self, entry: &ActionLogEntry) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn entry(ts: u64) -> ActionLogEntry {
        ActionLogEntry {
            ip: "1.2.3.4".to_string(),
            session_id: "abc".to_string(),
            action_code: RuleAction::TemporarilyBan,
            reason_code: ReasonCode::ReachedLimitSecond,
            timestamp: ts,
        }
    }

    #[test]
    fn kv_log_writes_distinct_keys_per_entry() {
        let store = InMemoryStore::new();
        let log = KvActionLog::new(&store, "site");
        let ts = 7_200 + 15;
        for _ in 0..5 {
            log.add(&entry(ts)).unwrap();
        }
        let keys = store.keys_with_prefix(&log.hour_prefix(2));
        assert_eq!(keys.len(), 5);
        assert!(keys.iter().all(|k| k.starts_with("site:actionlog:2:7215-")));
    }

    #[test]
    fn kv_log_entry_uses_numeric_codes() {
        let store = InMemoryStore::new();
        let log = KvActionLog::new(&store, "site");
        log.add(&entry(10)).unwrap();
        let key = store.keys_with_prefix("site:actionlog:0:").remove(0);
        let raw = store.get(&key).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["reason_code"], 14);
        assert_eq!(json["action_code"], 2);
    }

    #[test]
    fn memory_log_keeps_order() {
        let log = Arc::new(MemoryActionLog::new());
        let shared: Arc<MemoryActionLog> = Arc::clone(&log);
        shared.add(&entry(1)).unwrap();
        shared.add(&entry(2)).unwrap();
        let stamps: Vec<u64> = log.entries().iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![1, 2]);
    }
}
