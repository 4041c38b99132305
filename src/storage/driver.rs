// src/storage/driver.rs
// Channel-scoped record driver: filter / rule / session records over any KeyValueStore.
//
// Key layout (all under one channel):
//   <channel>:<kind>:<id>        record envelope (JSON)
//   <channel>:index:<kind>       JSON list of ids (rule, session)
//   <channel>:index:filter       count of filter ids appended so far
//   <channel>:index:filter:<n>   JSON page of up to FILTER_INDEX_PAGE ids
//   <channel>:session_order      monotonic waiting-room ticket counter
//   <channel>:once:<scope>:<id>  single-use marker, value = seen-until ts

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{KeyValueStore, StoreError};

/// Ids per filter index page. Visitor records are never listed on the
/// request path, so their index is append-only and paged.
pub const FILTER_INDEX_PAGE: u64 = 512;

/// The three logical record kinds the kernel persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Filter,
    Rule,
    Session,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Filter, RecordKind::Rule, RecordKind::Session];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Filter => "filter",
            RecordKind::Rule => "rule",
            RecordKind::Session => "session",
        }
    }

    /// Filter ids grow with every visitor ever seen; the other kinds stay
    /// bounded by active rules and sessions.
    fn paged_index(self) -> bool {
        matches!(self, RecordKind::Filter)
    }
}

/// Envelope written for every record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StoredRecord<T> {
    pub updated_at: u64,
    #[serde(default)]
    pub expires_at: Option<u64>,
    pub data: T,
}

/// Wall-clock budget for one kernel evaluation.
///
/// Checked between driver round trips; a single slow call is not preempted.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    /// `budget_ms == 0` means no deadline.
    pub fn new(budget_ms: u64) -> Self {
        Deadline {
            started: Instant::now(),
            budget: (budget_ms > 0).then(|| Duration::from_millis(budget_ms)),
        }
    }

    pub fn unlimited() -> Self {
        Deadline::new(0)
    }

    pub fn expired(&self) -> bool {
        match self.budget {
            Some(budget) => self.started.elapsed() > budget,
            None => false,
        }
    }
}

pub struct Driver<S> {
    store: S,
    channel: String,
}

impl<S: KeyValueStore> Driver<S> {
    pub fn new(store: S, channel: impl Into<String>) -> Self {
        Driver {
            store,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn record_key(&self, kind: RecordKind, id: &str) -> String {
        format!("{}:{}:{}", self.channel, kind.as_str(), id)
    }

    fn index_key(&self, kind: RecordKind) -> String {
        format!("{}:index:{}", self.channel, kind.as_str())
    }

    fn page_key(&self, kind: RecordKind, page: u64) -> String {
        format!("{}:{}", self.index_key(kind), page)
    }

    fn order_key(&self) -> String {
        format!("{}:session_order", self.channel)
    }

    fn once_key(&self, scope: &str, id: &str) -> String {
        format!("{}:once:{}:{}", self.channel, scope, id)
    }

    fn read_u64(&self, key: &str) -> Result<Option<u64>, StoreError> {
        Ok(self
            .store
            .get(key)?
            .and_then(|v| String::from_utf8(v).ok())
            .and_then(|s| s.trim().parse::<u64>().ok()))
    }

    fn read_id_list(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .store
            .get(key)?
            .and_then(|v| serde_json::from_slice::<Vec<String>>(&v).ok())
            .unwrap_or_default())
    }

    fn write_id_list(&self, key: &str, ids: &[String]) -> Result<(), StoreError> {
        let val = serde_json::to_vec(ids).map_err(|e| StoreError::Encoding {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.store.set(key, &val)
    }

    fn filter_page_count(&self, kind: RecordKind) -> Result<u64, StoreError> {
        let appended = self.read_u64(&self.index_key(kind))?.unwrap_or(0);
        Ok(appended.div_ceil(FILTER_INDEX_PAGE))
    }

    /// Every indexed id of `kind`, in insertion order, without duplicates.
    fn load_index(&self, kind: RecordKind) -> Result<Vec<String>, StoreError> {
        if !kind.paged_index() {
            return self.read_id_list(&self.index_key(kind));
        }
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for page in 0..self.filter_page_count(kind)? {
            for id in self.read_id_list(&self.page_key(kind, page))? {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Appends to the last page: one counter read, one page read, two writes.
    fn append_paged(&self, kind: RecordKind, id: &str) -> Result<(), StoreError> {
        let count_key = self.index_key(kind);
        let appended = self.read_u64(&count_key)?.unwrap_or(0);
        let page_key = self.page_key(kind, appended / FILTER_INDEX_PAGE);
        let mut page = self.read_id_list(&page_key)?;
        page.push(id.to_string());
        self.write_id_list(&page_key, &page)?;
        self.store
            .set(&count_key, appended.saturating_add(1).to_string().as_bytes())
    }

    /// Reads a record envelope. A record that no longer decodes is reported
    /// as absent so callers start over from defaults.
    pub fn get_record<T: DeserializeOwned>(
        &self,
        kind: RecordKind,
        id: &str,
    ) -> Result<Option<StoredRecord<T>>, StoreError> {
        let key = self.record_key(kind, id);
        let Some(raw) = self.store.get(&key)? else {
            return Ok(None);
        };
        match serde_json::from_slice::<StoredRecord<T>>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(key = %key, error = %e, "malformed record treated as absent");
                Ok(None)
            }
        }
    }

    pub fn get<T: DeserializeOwned>(
        &self,
        kind: RecordKind,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        Ok(self.get_record(kind, id)?.map(|r| r.data))
    }

    pub fn has(&self, kind: RecordKind, id: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(&self.record_key(kind, id))?.is_some())
    }

    /// Writes `data` under `id`. `expire_seconds` is recorded in the envelope
    /// for external tooling; reads do not enforce it.
    pub fn save<T: Serialize>(
        &self,
        kind: RecordKind,
        id: &str,
        data: &T,
        expire_seconds: u64,
        now: u64,
    ) -> Result<(), StoreError> {
        let key = self.record_key(kind, id);
        let is_new = kind.paged_index() && self.store.get(&key)?.is_none();
        let envelope = StoredRecord {
            updated_at: now,
            expires_at: (expire_seconds > 0).then(|| now.saturating_add(expire_seconds)),
            data,
        };
        let val = serde_json::to_vec(&envelope).map_err(|e| StoreError::Encoding {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        self.store.set(&key, &val)?;

        if kind.paged_index() {
            if is_new {
                self.append_paged(kind, id)?;
            }
            return Ok(());
        }
        let index_key = self.index_key(kind);
        let mut index = self.read_id_list(&index_key)?;
        if !index.iter().any(|v| v == id) {
            index.push(id.to_string());
            self.write_id_list(&index_key, &index)?;
        }
        Ok(())
    }

    /// Removes a record. Returns whether it existed. Deleting a missing id is
    /// not an error. Paged index entries are left behind and skipped on read.
    pub fn delete(&self, kind: RecordKind, id: &str) -> Result<bool, StoreError> {
        let key = self.record_key(kind, id);
        let existed = self.store.get(&key)?.is_some();
        self.store.delete(&key)?;
        if kind.paged_index() {
            return Ok(existed);
        }

        let index_key = self.index_key(kind);
        let mut index = self.read_id_list(&index_key)?;
        let before = index.len();
        index.retain(|v| v != id);
        if index.len() != before {
            self.write_id_list(&index_key, &index)?;
        }
        Ok(existed)
    }

    /// All records of `kind`, most recently written first. Index entries whose
    /// record vanished or no longer decodes are pruned from list indexes and
    /// skipped in paged ones.
    pub fn get_all<T: DeserializeOwned>(
        &self,
        kind: RecordKind,
    ) -> Result<Vec<(String, StoredRecord<T>)>, StoreError> {
        let index = self.load_index(kind)?;
        let original_len = index.len();
        let mut live_ids = Vec::with_capacity(original_len);
        let mut records = Vec::with_capacity(original_len);

        for id in index {
            if let Some(record) = self.get_record::<T>(kind, &id)? {
                live_ids.push(id.clone());
                records.push((id, record));
            }
        }

        if !kind.paged_index() && live_ids.len() != original_len {
            self.write_id_list(&self.index_key(kind), &live_ids)?;
        }

        records.sort_by(|a, b| b.1.updated_at.cmp(&a.1.updated_at));
        Ok(records)
    }

    /// Drops every filter, rule and session record of this channel. The
    /// session order counter survives so tickets are never handed out twice.
    pub fn rebuild(&self) -> Result<(), StoreError> {
        for kind in RecordKind::ALL {
            for id in self.load_index(kind)? {
                self.store.delete(&self.record_key(kind, &id))?;
            }
            if kind.paged_index() {
                for page in 0..self.filter_page_count(kind)? {
                    self.store.delete(&self.page_key(kind, page))?;
                }
            }
            self.store.delete(&self.index_key(kind))?;
        }
        Ok(())
    }

    /// Next waiting-room ticket. Starts at 1.
    pub fn next_session_order(&self) -> Result<u64, StoreError> {
        let key = self.order_key();
        let next = self.read_u64(&key)?.unwrap_or(0).saturating_add(1);
        self.store.set(&key, next.to_string().as_bytes())?;
        Ok(next)
    }

    /// Marks `id` in `scope` as used until `until`. Returns false when it was
    /// already used and the mark has not lapsed. Lapsed marks are replaced.
    pub fn claim_once(
        &self,
        scope: &str,
        id: &str,
        until: u64,
        now: u64,
    ) -> Result<bool, StoreError> {
        if until <= now {
            return Ok(false);
        }
        let key = self.once_key(scope, id);
        if let Some(seen_until) = self.read_u64(&key)? {
            if now <= seen_until {
                return Ok(false);
            }
        }
        self.store.set(&key, until.to_string().as_bytes())?;
        Ok(true)
    }
}
