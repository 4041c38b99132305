// src/config/mod.rs
// Kernel configuration. Per-channel settings are loaded from KV; anything a
// stored document omits falls back to config/defaults.env.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::storage::KeyValueStore;
use crate::visitor::Granularity;

const DEFAULTS_ENV_TEXT: &str = include_str!("../../config/defaults.env");

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration unavailable (KV store error)")]
    StoreUnavailable,
    #[error("Configuration unavailable (missing KV config)")]
    MissingConfig,
    #[error("Configuration unavailable (invalid KV config)")]
    InvalidConfig,
}

/// Setup-time validation failures. Never raised per request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("channel must not be empty")]
    EmptyChannel,
    #[error("channel {0:?} must not contain ':'")]
    InvalidChannel(String),
    #[error("time_reset_limit must be greater than zero")]
    ZeroTimeResetLimit,
    #[error("session_limit.period must be greater than zero when session_limit.count is set")]
    ZeroSessionPeriod,
    #[error("cookie_name must not be empty when the cookie filter is enabled")]
    EmptyCookieName,
    #[error("session_cookie_name must not be empty")]
    EmptySessionCookieName,
}

/// Pageview quota per window. Zero disables the window.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeUnitQuota {
    #[serde(default = "default_quota_second")]
    pub s: u32,
    #[serde(default = "default_quota_minute")]
    pub m: u32,
    #[serde(default = "default_quota_hour")]
    pub h: u32,
    #[serde(default = "default_quota_day")]
    pub d: u32,
}

impl Default for TimeUnitQuota {
    fn default() -> Self {
        TimeUnitQuota {
            s: default_quota_second(),
            m: default_quota_minute(),
            h: default_quota_hour(),
            d: default_quota_day(),
        }
    }
}

impl TimeUnitQuota {
    pub fn get(&self, granularity: Granularity) -> u32 {
        match granularity {
            Granularity::Second => self.s,
            Granularity::Minute => self.m,
            Granularity::Hour => self.h,
            Granularity::Day => self.d,
        }
    }
}

/// Flag thresholds. A flag strictly above its limit is a breach.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnusualBehaviorLimits {
    #[serde(default = "default_limit_cookie")]
    pub cookie: u32,
    #[serde(default = "default_limit_session")]
    pub session: u32,
    #[serde(default = "default_limit_referer")]
    pub referer: u32,
}

impl Default for UnusualBehaviorLimits {
    fn default() -> Self {
        UnusualBehaviorLimits {
            cookie: default_limit_cookie(),
            session: default_limit_session(),
            referer: default_limit_referer(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filters {
    #[serde(default = "default_filter_frequency")]
    pub frequency: bool,
    #[serde(default = "default_filter_cookie")]
    pub cookie: bool,
    #[serde(default = "default_filter_session")]
    pub session: bool,
    #[serde(default = "default_filter_referer")]
    pub referer: bool,
}

impl Default for Filters {
    fn default() -> Self {
        Filters {
            frequency: default_filter_frequency(),
            cookie: default_filter_cookie(),
            session: default_filter_session(),
            referer: default_filter_referer(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimit {
    #[serde(default = "default_session_limit_count")]
    pub count: u64,
    #[serde(default = "default_session_limit_period")]
    pub period: u64,
}

impl Default for SessionLimit {
    fn default() -> Self {
        SessionLimit {
            count: default_session_limit_count(),
            period: default_session_limit_period(),
        }
    }
}

impl SessionLimit {
    pub fn enabled(&self) -> bool {
        self.count > 0
    }
}

/// What the kernel answers when storage fails or times out.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    Open,
    Closed,
}

impl FailMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FailMode::Open => "open",
            FailMode::Closed => "closed",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    pub time_unit_quota: TimeUnitQuota,
    #[serde(default = "default_time_reset_limit")]
    pub time_reset_limit: u64,
    #[serde(default = "default_interval_check_session")]
    pub interval_check_session: u64,
    #[serde(default = "default_interval_check_referer")]
    pub interval_check_referer: u64,
    #[serde(default)]
    pub limit_unusual_behavior: UnusualBehaviorLimits,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_cookie_value")]
    pub cookie_value: String,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub session_limit: SessionLimit,
    #[serde(default = "default_temporary_ban_seconds")]
    pub temporary_ban_seconds: u64,
    #[serde(default = "default_deny_attempts_limit")]
    pub deny_attempts_limit: u32,
    #[serde(default = "default_excluded_paths")]
    pub excluded_paths: Vec<String>,
    #[serde(default = "default_fail_mode")]
    pub fail_mode: FailMode,
    #[serde(default = "default_driver_timeout_ms")]
    pub driver_timeout_ms: u64,
    #[serde(default = "default_session_cookie_name")]
    pub session_cookie_name: String,
}

impl Default for Config {
    fn default() -> Self {
        defaults().clone()
    }
}

impl Config {
    /// Loads config for a channel from KV only.
    pub fn load(store: &impl KeyValueStore, channel: &str) -> Result<Self, ConfigLoadError> {
        let key = format!("config:{}", channel);
        let val = store
            .get(&key)
            .map_err(|_| ConfigLoadError::StoreUnavailable)?
            .ok_or(ConfigLoadError::MissingConfig)?;
        let mut cfg = Config::from_json(&val)?;
        cfg.channel = channel.to_string();
        Ok(cfg)
    }

    /// Like `load`, but a channel without a stored document runs on defaults.
    pub fn load_or_default(
        store: &impl KeyValueStore,
        channel: &str,
    ) -> Result<Self, ConfigLoadError> {
        match Config::load(store, channel) {
            Err(ConfigLoadError::MissingConfig) => {
                tracing::info!(channel, "no stored config; using compiled defaults");
                let mut cfg = defaults().clone();
                cfg.channel = channel.to_string();
                Ok(cfg)
            }
            other => other,
        }
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigLoadError> {
        serde_json::from_slice::<Config>(raw).map_err(|_| ConfigLoadError::InvalidConfig)
    }

    /// Persists this config under `config:<channel>`.
    pub fn store(&self, store: &impl KeyValueStore) -> Result<(), crate::storage::StoreError> {
        let key = format!("config:{}", self.channel);
        let val = serde_json::to_vec(self).map_err(|e| crate::storage::StoreError::Encoding {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        store.set(&key, &val)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.trim().is_empty() {
            return Err(ConfigError::EmptyChannel);
        }
        if self.channel.contains(':') {
            return Err(ConfigError::InvalidChannel(self.channel.clone()));
        }
        if self.time_reset_limit == 0 {
            return Err(ConfigError::ZeroTimeResetLimit);
        }
        if self.session_limit.enabled() && self.session_limit.period == 0 {
            return Err(ConfigError::ZeroSessionPeriod);
        }
        if self.filters.cookie && self.cookie_name.trim().is_empty() {
            return Err(ConfigError::EmptyCookieName);
        }
        if self.session_cookie_name.trim().is_empty() {
            return Err(ConfigError::EmptySessionCookieName);
        }
        Ok(())
    }

    /// Returns true if `path` matches an excluded entry (exact, or prefix with
    /// a trailing `*`). Inline `#` comments are ignored.
    pub fn is_path_excluded(&self, path: &str) -> bool {
        for entry in &self.excluded_paths {
            let entry = entry.split('#').next().unwrap_or("").trim();
            if entry.is_empty() {
                continue;
            }
            if let Some(prefix) = entry.strip_suffix('*') {
                if path.starts_with(prefix) {
                    return true;
                }
            } else if path == entry {
                return true;
            }
        }
        false
    }

    /// Applies `GATE_KV_STORE_FAIL_OPEN` when set to a boolean-like value.
    pub fn apply_env_overrides(&mut self) {
        let raw = std::env::var("GATE_KV_STORE_FAIL_OPEN").ok();
        if let Some(mode) = parse_fail_open_override(raw.as_deref()) {
            self.fail_mode = mode;
        }
    }
}

pub(crate) fn parse_fail_open_override(value: Option<&str>) -> Option<FailMode> {
    value.and_then(parse_bool_like).map(|open| {
        if open {
            FailMode::Open
        } else {
            FailMode::Closed
        }
    })
}

static DEFAULTS_MAP: Lazy<Result<HashMap<String, String>, String>> =
    Lazy::new(|| parse_defaults_env_map(DEFAULTS_ENV_TEXT));

static DEFAULT_CONFIG: Lazy<Config> = Lazy::new(|| Config {
    channel: default_channel(),
    time_unit_quota: TimeUnitQuota::default(),
    time_reset_limit: default_time_reset_limit(),
    interval_check_session: default_interval_check_session(),
    interval_check_referer: default_interval_check_referer(),
    limit_unusual_behavior: UnusualBehaviorLimits::default(),
    cookie_name: default_cookie_name(),
    cookie_value: default_cookie_value(),
    filters: Filters::default(),
    session_limit: SessionLimit::default(),
    temporary_ban_seconds: default_temporary_ban_seconds(),
    deny_attempts_limit: default_deny_attempts_limit(),
    excluded_paths: default_excluded_paths(),
    fail_mode: default_fail_mode(),
    driver_timeout_ms: default_driver_timeout_ms(),
    session_cookie_name: default_session_cookie_name(),
});

pub fn defaults() -> &'static Config {
    &DEFAULT_CONFIG
}

fn parse_bool_like(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_fail_mode(value: &str) -> Option<FailMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "open" => Some(FailMode::Open),
        "closed" => Some(FailMode::Closed),
        _ => None,
    }
}

fn parse_defaults_env_map(input: &str) -> Result<HashMap<String, String>, String> {
    let mut map = HashMap::new();
    for (index, raw_line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, raw_value) = line
            .split_once('=')
            .ok_or_else(|| format!("Invalid defaults line {}: missing '='", line_no))?;

        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Invalid defaults line {}: empty key", line_no));
        }
        if !key
            .chars()
            .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_')
        {
            return Err(format!("Invalid defaults key '{}' on line {}", key, line_no));
        }

        let mut value = raw_value.trim().to_string();
        if let Some((head, _)) = value.split_once(" #") {
            value = head.trim().to_string();
        }
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

fn defaults_map() -> &'static HashMap<String, String> {
    match &*DEFAULTS_MAP {
        Ok(map) => map,
        Err(err) => panic!("Invalid config/defaults.env: {}", err),
    }
}

fn defaults_raw(key: &str) -> String {
    defaults_map()
        .get(key)
        .cloned()
        .unwrap_or_else(|| panic!("Missing required defaults key {}", key))
}

fn defaults_bool(key: &str) -> bool {
    parse_bool_like(defaults_raw(key).as_str())
        .unwrap_or_else(|| panic!("Invalid boolean default for {}", key))
}

fn defaults_u64(key: &str) -> u64 {
    defaults_raw(key)
        .trim()
        .parse::<u64>()
        .unwrap_or_else(|_| panic!("Invalid integer default for {}", key))
}

fn defaults_u32(key: &str) -> u32 {
    defaults_raw(key)
        .trim()
        .parse::<u32>()
        .unwrap_or_else(|_| panic!("Invalid integer default for {}", key))
}

fn defaults_string_list(key: &str) -> Vec<String> {
    defaults_raw(key)
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn default_channel() -> String {
    defaults_raw("GATE_CHANNEL")
}

fn default_quota_second() -> u32 {
    defaults_u32("GATE_QUOTA_SECOND")
}

fn default_quota_minute() -> u32 {
    defaults_u32("GATE_QUOTA_MINUTE")
}

fn default_quota_hour() -> u32 {
    defaults_u32("GATE_QUOTA_HOUR")
}

fn default_quota_day() -> u32 {
    defaults_u32("GATE_QUOTA_DAY")
}

fn default_time_reset_limit() -> u64 {
    defaults_u64("GATE_TIME_RESET_LIMIT")
}

fn default_interval_check_session() -> u64 {
    defaults_u64("GATE_INTERVAL_CHECK_SESSION")
}

fn default_interval_check_referer() -> u64 {
    defaults_u64("GATE_INTERVAL_CHECK_REFERER")
}

fn default_limit_cookie() -> u32 {
    defaults_u32("GATE_LIMIT_COOKIE")
}

fn default_limit_session() -> u32 {
    defaults_u32("GATE_LIMIT_SESSION")
}

fn default_limit_referer() -> u32 {
    defaults_u32("GATE_LIMIT_REFERER")
}

fn default_cookie_name() -> String {
    defaults_raw("GATE_COOKIE_NAME")
}

fn default_cookie_value() -> String {
    defaults_raw("GATE_COOKIE_VALUE")
}

fn default_filter_frequency() -> bool {
    defaults_bool("GATE_FILTER_FREQUENCY")
}

fn default_filter_cookie() -> bool {
    defaults_bool("GATE_FILTER_COOKIE")
}

fn default_filter_session() -> bool {
    defaults_bool("GATE_FILTER_SESSION")
}

fn default_filter_referer() -> bool {
    defaults_bool("GATE_FILTER_REFERER")
}

fn default_session_limit_count() -> u64 {
    defaults_u64("GATE_SESSION_LIMIT_COUNT")
}

fn default_session_limit_period() -> u64 {
    defaults_u64("GATE_SESSION_LIMIT_PERIOD")
}

fn default_temporary_ban_seconds() -> u64 {
    defaults_u64("GATE_TEMPORARY_BAN_SECONDS")
}

fn default_deny_attempts_limit() -> u32 {
    defaults_u32("GATE_DENY_ATTEMPTS_LIMIT")
}

fn default_excluded_paths() -> Vec<String> {
    defaults_string_list("GATE_EXCLUDED_PATHS")
}

fn default_fail_mode() -> FailMode {
    let raw = defaults_raw("GATE_FAIL_MODE");
    parse_fail_mode(raw.as_str())
        .unwrap_or_else(|| panic!("Invalid fail mode default GATE_FAIL_MODE={}", raw))
}

fn default_driver_timeout_ms() -> u64 {
    defaults_u64("GATE_DRIVER_TIMEOUT_MS")
}

fn default_session_cookie_name() -> String {
    defaults_raw("GATE_SESSION_COOKIE_NAME")
}
