// src/enforcement/rules.rs
// Manual and automatic per-IP overrides: ban, temporary ban, allow, unban.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codes::{ReasonCode, RuleAction};
use crate::storage::{Driver, KeyValueStore, RecordKind, StoreError};

/// One override for one IP. `rule_type` is never `Unban` once persisted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    pub ip: String,
    pub rule_type: RuleAction,
    pub reason: ReasonCode,
    pub created_at: u64,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub expires_at: Option<u64>,
}

impl RuleEntry {
    pub fn is_active(&self, now: u64) -> bool {
        match (self.rule_type, self.expires_at) {
            (RuleAction::Unban, _) => false,
            (RuleAction::TemporarilyBan, Some(expires)) => expires > now,
            _ => true,
        }
    }
}

pub struct RuleStore<'a, S> {
    driver: &'a Driver<S>,
    temporary_ban_seconds: u64,
}

impl<'a, S: KeyValueStore> RuleStore<'a, S> {
    pub fn new(driver: &'a Driver<S>, temporary_ban_seconds: u64) -> Self {
        RuleStore {
            driver,
            temporary_ban_seconds,
        }
    }

    /// The active rule for `ip`. An elapsed temporary ban is deleted here.
    pub fn lookup(&self, ip: &str, now: u64) -> Result<Option<RuleEntry>, StoreError> {
        let Some(entry) = self.driver.get::<RuleEntry>(RecordKind::Rule, ip)? else {
            return Ok(None);
        };
        if entry.is_active(now) {
            return Ok(Some(entry));
        }
        debug!(ip = %ip, rule = entry.rule_type.as_str(), "dropping lapsed rule");
        self.driver.delete(RecordKind::Rule, ip)?;
        Ok(None)
    }

    /// Applies `action` to `ip` and returns the entry now in force, if any.
    pub fn apply(
        &self,
        action: RuleAction,
        reason: ReasonCode,
        ip: &str,
        now: u64,
    ) -> Result<Option<RuleEntry>, StoreError> {
        if action == RuleAction::Unban {
            let existed = self.driver.delete(RecordKind::Rule, ip)?;
            info!(ip = %ip, existed, reason = reason.code(), "rule removed");
            return Ok(None);
        }

        let previous = self.driver.get::<RuleEntry>(RecordKind::Rule, ip)?;
        let attempts = match (&previous, action) {
            (Some(prev), RuleAction::Ban | RuleAction::TemporarilyBan) => {
                prev.attempts.saturating_add(1)
            }
            _ => 0,
        };
        let expires_at = match action {
            RuleAction::TemporarilyBan if self.temporary_ban_seconds > 0 => {
                Some(now.saturating_add(self.temporary_ban_seconds))
            }
            _ => None,
        };
        let entry = RuleEntry {
            ip: ip.to_string(),
            rule_type: action,
            reason,
            created_at: now,
            attempts,
            expires_at,
        };
        let ttl = expires_at.map(|e| e.saturating_sub(now)).unwrap_or(0);
        self.driver.save(RecordKind::Rule, ip, &entry, ttl, now)?;
        info!(
            ip = %ip,
            action = action.as_str(),
            reason = reason.code(),
            attempts,
            "rule applied"
        );
        Ok(Some(entry))
    }

    /// Bumps the attempt counter of an existing rule without touching its
    /// type or expiry. Returns the updated entry.
    pub fn record_attempt(&self, ip: &str, now: u64) -> Result<Option<RuleEntry>, StoreError> {
        let Some(record) = self.driver.get_record::<RuleEntry>(RecordKind::Rule, ip)? else {
            return Ok(None);
        };
        let mut entry = record.data;
        entry.attempts = entry.attempts.saturating_add(1);
        let ttl = record
            .expires_at
            .map(|e| e.saturating_sub(now))
            .unwrap_or(0);
        self.driver.save(RecordKind::Rule, ip, &entry, ttl, now)?;
        Ok(Some(entry))
    }

    /// Active rules, most recently written first. Lapsed temporary bans are
    /// deleted on the way.
    pub fn list(&self, now: u64) -> Result<Vec<RuleEntry>, StoreError> {
        let mut active = Vec::new();
        for (id, record) in self.driver.get_all::<RuleEntry>(RecordKind::Rule)? {
            if record.data.is_active(now) {
                active.push(record.data);
            } else {
                self.driver.delete(RecordKind::Rule, &id)?;
            }
        }
        Ok(active)
    }
}
