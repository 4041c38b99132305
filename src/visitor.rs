// src/visitor.rs
// Per-IP visitor record: window counters, anomaly flags and bookkeeping.

use serde::{Deserialize, Serialize};

/// Fixed window sizes the rate engine counts over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Second,
    Minute,
    Hour,
    Day,
}

impl Granularity {
    /// Evaluation order: shortest window first.
    pub const ALL: [Granularity; 4] = [
        Granularity::Second,
        Granularity::Minute,
        Granularity::Hour,
        Granularity::Day,
    ];

    pub fn window_seconds(self) -> u64 {
        match self {
            Granularity::Second => 1,
            Granularity::Minute => 60,
            Granularity::Hour => 3_600,
            Granularity::Day => 86_400,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Second => "second",
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        }
    }

    fn slot(self) -> usize {
        match self {
            Granularity::Second => 0,
            Granularity::Minute => 1,
            Granularity::Hour => 2,
            Granularity::Day => 3,
        }
    }
}

/// One fixed window: when it opened and how many pageviews it has seen.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub first_time: u64,
    pub pageviews: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VisitorRecord {
    pub ip: String,
    #[serde(default)]
    pub last_session_id: String,
    #[serde(default)]
    pub resolved_hostname: String,
    #[serde(default)]
    pub windows: [Window; 4],
    #[serde(default)]
    pub last_time: u64,
    #[serde(default)]
    pub flag_cookie: u32,
    #[serde(default)]
    pub flag_multi_session: u32,
    #[serde(default)]
    pub flag_empty_referer: u32,
    #[serde(default)]
    pub session_checked_at: u64,
    #[serde(default)]
    pub referer_checked_at: u64,
}

impl VisitorRecord {
    /// A visitor seen for the first time at `now`. Every window opens now and
    /// is still empty.
    pub fn first_seen(ip: &str, now: u64) -> Self {
        VisitorRecord {
            ip: ip.to_string(),
            last_session_id: String::new(),
            resolved_hostname: String::new(),
            windows: [Window {
                first_time: now,
                pageviews: 0,
            }; 4],
            last_time: now,
            flag_cookie: 0,
            flag_multi_session: 0,
            flag_empty_referer: 0,
            session_checked_at: 0,
            referer_checked_at: 0,
        }
    }

    pub fn window(&self, granularity: Granularity) -> &Window {
        &self.windows[granularity.slot()]
    }

    pub fn window_mut(&mut self, granularity: Granularity) -> &mut Window {
        &mut self.windows[granularity.slot()]
    }

    pub fn pageviews(&self, granularity: Granularity) -> u32 {
        self.window(granularity).pageviews
    }

    pub fn reset_flags(&mut self) {
        self.flag_cookie = 0;
        self.flag_multi_session = 0;
        self.flag_empty_referer = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_seen_opens_all_windows_empty() {
        let v = VisitorRecord::first_seen("10.0.0.1", 500);
        for g in Granularity::ALL {
            assert_eq!(v.window(g).first_time, 500);
            assert_eq!(v.pageviews(g), 0);
        }
        assert_eq!(v.last_time, 500);
    }

    #[test]
    fn window_slots_are_independent() {
        let mut v = VisitorRecord::first_seen("10.0.0.1", 0);
        v.window_mut(Granularity::Hour).pageviews = 9;
        assert_eq!(v.pageviews(Granularity::Hour), 9);
        assert_eq!(v.pageviews(Granularity::Minute), 0);
    }

    #[test]
    fn legacy_record_without_flags_deserializes() {
        let raw = r#"{"ip":"1.2.3.4"}"#;
        let v: VisitorRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(v.flag_cookie, 0);
        assert_eq!(v.windows, [Window::default(); 4]);
    }
}
