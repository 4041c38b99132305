// src/enforcement/session_limit.rs
// Waiting room: caps concurrently active sessions and queues the rest in
// arrival order. Idle sessions are reclaimed after `period` seconds.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::{Driver, KeyValueStore, RecordKind, StoredRecord, StoreError};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub session_id: String,
    pub ip: String,
    pub order: u64,
    pub created_at: u64,
    pub last_seen_at: u64,
}

impl SessionEntry {
    fn is_expired(&self, period: u64, now: u64) -> bool {
        now.saturating_sub(self.last_seen_at) > period
    }
}

/// Where a session stands in the waiting room right now.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    pub session_id: String,
    /// Permanent arrival ticket.
    pub order: u64,
    /// 1-based rank among the currently active sessions.
    pub position: u64,
    /// How many sessions are ahead beyond the cap; <= 0 when admitted.
    pub wait_number: i64,
    pub admitted: bool,
    pub active: u64,
}

pub struct SessionLimiter<'a, S> {
    driver: &'a Driver<S>,
    limit: u64,
    period: u64,
}

impl<'a, S: KeyValueStore> SessionLimiter<'a, S> {
    pub fn new(driver: &'a Driver<S>, limit: u64, period: u64) -> Self {
        SessionLimiter {
            driver,
            limit,
            period,
        }
    }

    fn live_entries(&self, now: u64, prune: bool) -> Result<Vec<SessionEntry>, StoreError> {
        let all: Vec<(String, StoredRecord<SessionEntry>)> =
            self.driver.get_all(RecordKind::Session)?;
        let mut live = Vec::with_capacity(all.len());
        for (id, record) in all {
            if record.data.is_expired(self.period, now) {
                if prune {
                    self.driver.delete(RecordKind::Session, &id)?;
                }
            } else {
                live.push(record.data);
            }
        }
        Ok(live)
    }

    fn ticket(&self, entry: &SessionEntry, live: &[SessionEntry]) -> SessionTicket {
        let ahead = live.iter().filter(|e| e.order < entry.order).count() as u64;
        let position = ahead + 1;
        SessionTicket {
            session_id: entry.session_id.clone(),
            order: entry.order,
            position,
            wait_number: position as i64 - self.limit as i64,
            admitted: position <= self.limit,
            active: live.len() as u64,
        }
    }

    /// Registers or refreshes `session_id` and reports its standing. Expired
    /// sessions are reclaimed first, so a returning visitor whose entry lapsed
    /// draws a fresh ticket.
    pub fn admit(&self, session_id: &str, ip: &str, now: u64) -> Result<SessionTicket, StoreError> {
        let held = self
            .driver
            .get::<SessionEntry>(RecordKind::Session, session_id)?
            .filter(|e| !e.is_expired(self.period, now));
        let mut live = self.live_entries(now, true)?;

        let entry = match held {
            Some(mut existing) => {
                existing.last_seen_at = now;
                existing
            }
            None => SessionEntry {
                session_id: session_id.to_string(),
                ip: ip.to_string(),
                order: self.driver.next_session_order()?,
                created_at: now,
                last_seen_at: now,
            },
        };
        live.retain(|e| e.session_id != session_id);
        live.push(entry.clone());
        self.driver
            .save(RecordKind::Session, session_id, &entry, self.period, now)?;

        let ticket = self.ticket(&entry, &live);
        debug!(
            session = %session_id,
            order = ticket.order,
            position = ticket.position,
            admitted = ticket.admitted,
            "waiting room"
        );
        Ok(ticket)
    }

    /// Read-only view of a session's standing. None for unknown or expired
    /// sessions.
    pub fn status(&self, session_id: &str, now: u64) -> Result<Option<SessionTicket>, StoreError> {
        let live = self.live_entries(now, false)?;
        Ok(live
            .iter()
            .find(|e| e.session_id == session_id)
            .map(|entry| self.ticket(entry, &live)))
    }

    /// Drops a session immediately. Returns whether it was held.
    pub fn release(&self, session_id: &str) -> Result<bool, StoreError> {
        self.driver.delete(RecordKind::Session, session_id)
    }

    /// Deletes every expired session. Returns how many remain active.
    pub fn sweep(&self, now: u64) -> Result<u64, StoreError> {
        Ok(self.live_entries(now, true)?.len() as u64)
    }

    pub fn active_count(&self, now: u64) -> Result<u64, StoreError> {
        Ok(self.live_entries(now, false)?.len() as u64)
    }
}

#[cfg(test)]
mod tests;
