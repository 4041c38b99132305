// src/enforcement/behavior.rs
// Anomaly flags: session churn, empty referer and missing JS cookie, with decay.

use crate::config::Config;
use crate::visitor::VisitorRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagName {
    Session,
    Referer,
    Cookie,
}

impl FlagName {
    pub fn as_str(self) -> &'static str {
        match self {
            FlagName::Session => "session",
            FlagName::Referer => "referer",
            FlagName::Cookie => "cookie",
        }
    }
}

/// What the current request shows the scorer.
#[derive(Debug, Clone, Copy)]
pub struct BehaviorSignals<'a> {
    pub session_id: &'a str,
    pub referer_present: bool,
    pub cookie: Option<&'a str>,
    /// The visitor record was created by this request.
    pub first_seen: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BehaviorOutcome {
    pub ok: bool,
    pub flag: Option<FlagName>,
}

/// Forgives every flag if the visitor was silent longer than
/// `time_reset_limit`. Returns whether anything was reset.
pub fn apply_decay(visitor: &mut VisitorRecord, time_reset_limit: u64, now: u64) -> bool {
    if now.saturating_sub(visitor.last_time) > time_reset_limit {
        let had_flags = visitor.flag_cookie > 0
            || visitor.flag_multi_session > 0
            || visitor.flag_empty_referer > 0;
        visitor.reset_flags();
        return had_flags;
    }
    false
}

fn check_session(visitor: &mut VisitorRecord, session_id: &str, interval: u64, now: u64) {
    if session_id.is_empty() {
        return;
    }
    if now.saturating_sub(visitor.session_checked_at) >= interval {
        if !visitor.last_session_id.is_empty() && visitor.last_session_id != session_id {
            visitor.flag_multi_session = visitor.flag_multi_session.saturating_add(1);
        }
        visitor.session_checked_at = now;
    }
    visitor.last_session_id = session_id.to_string();
}

fn check_referer(
    visitor: &mut VisitorRecord,
    referer_present: bool,
    first_seen: bool,
    interval: u64,
    now: u64,
) {
    if now.saturating_sub(visitor.referer_checked_at) < interval {
        return;
    }
    // A landing page legitimately has no referer.
    if !first_seen && !referer_present {
        visitor.flag_empty_referer = visitor.flag_empty_referer.saturating_add(1);
    }
    visitor.referer_checked_at = now;
}

fn check_cookie(visitor: &mut VisitorRecord, cookie: Option<&str>, expected: &str) {
    match cookie {
        Some(value) if value == expected => visitor.flag_cookie = 0,
        _ => visitor.flag_cookie = visitor.flag_cookie.saturating_add(1),
    }
}

/// Runs decay, then every enabled filter, then the thresholds in the order
/// session, referer, cookie. Flags are updated in place even when a breach is
/// reported.
pub fn check_behavior(
    visitor: &mut VisitorRecord,
    signals: &BehaviorSignals<'_>,
    cfg: &Config,
    now: u64,
) -> BehaviorOutcome {
    apply_decay(visitor, cfg.time_reset_limit, now);

    let filters = cfg.filters;
    if filters.session {
        check_session(visitor, signals.session_id, cfg.interval_check_session, now);
    }
    if filters.referer {
        check_referer(
            visitor,
            signals.referer_present,
            signals.first_seen,
            cfg.interval_check_referer,
            now,
        );
    }
    if filters.cookie {
        check_cookie(visitor, signals.cookie, &cfg.cookie_value);
    }

    let limits = cfg.limit_unusual_behavior;
    let flag = if filters.session && visitor.flag_multi_session > limits.session {
        Some(FlagName::Session)
    } else if filters.referer && visitor.flag_empty_referer > limits.referer {
        Some(FlagName::Referer)
    } else if filters.cookie && visitor.flag_cookie > limits.cookie {
        Some(FlagName::Cookie)
    } else {
        None
    };

    BehaviorOutcome {
        ok: flag.is_none(),
        flag,
    }
}
