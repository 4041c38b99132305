// src/enforcement/rate.rs
// Fixed-window pageview counters (second / minute / hour / day).

use crate::config::TimeUnitQuota;
use crate::visitor::{Granularity, VisitorRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyOutcome {
    pub ok: bool,
    pub breached: Option<Granularity>,
}

impl FrequencyOutcome {
    fn passed() -> Self {
        FrequencyOutcome {
            ok: true,
            breached: None,
        }
    }

    fn breached(granularity: Granularity) -> Self {
        FrequencyOutcome {
            ok: false,
            breached: Some(granularity),
        }
    }
}

/// Counts the current request against every enabled window, shortest first.
///
/// A window whose length has elapsed restarts at `now` before counting. The
/// first window whose count goes strictly above its quota is reported and the
/// remaining windows are left untouched for this request. The caller persists
/// `visitor` whatever the outcome.
pub fn check_frequency(
    visitor: &mut VisitorRecord,
    quotas: &TimeUnitQuota,
    now: u64,
) -> FrequencyOutcome {
    for granularity in Granularity::ALL {
        let quota = quotas.get(granularity);
        if quota == 0 {
            continue;
        }
        let window = visitor.window_mut(granularity);
        if now.saturating_sub(window.first_time) >= granularity.window_seconds() {
            window.first_time = now;
            window.pageviews = 0;
        }
        window.pageviews = window.pageviews.saturating_add(1);
        if window.pageviews > quota {
            return FrequencyOutcome::breached(granularity);
        }
    }
    FrequencyOutcome::passed()
}

/// Pageviews counted in the current window, or 0 if it already elapsed.
pub fn current_usage(visitor: &VisitorRecord, granularity: Granularity, now: u64) -> u32 {
    let window = visitor.window(granularity);
    if now.saturating_sub(window.first_time) >= granularity.window_seconds() {
        0
    } else {
        window.pageviews
    }
}
