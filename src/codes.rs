// src/codes.rs
// Stable numeric codes shared by verdicts, rule entries and the action log.

use serde::{Deserialize, Serialize};

use crate::enforcement::behavior::FlagName;
use crate::error::KernelError;
use crate::input_validation::normalize_code_token;
use crate::visitor::Granularity;

/// Final answer for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Deny,
    Allow,
    TemporarilyDeny,
    Limit,
}

impl Verdict {
    pub fn code(self) -> u8 {
        match self {
            Verdict::Deny => 0,
            Verdict::Allow => 1,
            Verdict::TemporarilyDeny => 2,
            Verdict::Limit => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Deny => "deny",
            Verdict::Allow => "allow",
            Verdict::TemporarilyDeny => "temporarily_deny",
            Verdict::Limit => "limit",
        }
    }

    pub fn is_deny_class(self) -> bool {
        matches!(self, Verdict::Deny | Verdict::TemporarilyDeny)
    }
}

/// Operation on the rule override store, and the action recorded in the log.
/// Persisted as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RuleAction {
    Ban,
    Allow,
    TemporarilyBan,
    Unban,
}

impl RuleAction {
    pub fn code(self) -> u8 {
        match self {
            RuleAction::Ban => 0,
            RuleAction::Allow => 1,
            RuleAction::TemporarilyBan => 2,
            RuleAction::Unban => 9,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(RuleAction::Ban),
            1 => Some(RuleAction::Allow),
            2 => Some(RuleAction::TemporarilyBan),
            9 => Some(RuleAction::Unban),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuleAction::Ban => "ban",
            RuleAction::Allow => "allow",
            RuleAction::TemporarilyBan => "temporarily_ban",
            RuleAction::Unban => "unban",
        }
    }

    /// Accepts the snake_case name or the numeric code.
    pub fn parse(input: &str) -> Result<Self, KernelError> {
        let invalid = || KernelError::InvalidAction(input.to_string());
        let token = normalize_code_token(input).ok_or_else(invalid)?;
        if let Ok(code) = token.parse::<u8>() {
            return RuleAction::from_code(code).ok_or_else(invalid);
        }
        match token.as_str() {
            "ban" | "deny" => Ok(RuleAction::Ban),
            "allow" => Ok(RuleAction::Allow),
            "temporarily_ban" | "temporarily_deny" => Ok(RuleAction::TemporarilyBan),
            "unban" => Ok(RuleAction::Unban),
            _ => Err(invalid()),
        }
    }
}

impl From<RuleAction> for u8 {
    fn from(action: RuleAction) -> Self {
        action.code()
    }
}

impl TryFrom<u8> for RuleAction {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        RuleAction::from_code(code).ok_or_else(|| format!("unknown action code {}", code))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum ReasonCode {
    ManualBan,
    TooManySessions,
    TooManyAccesses,
    EmptyJsCookie,
    EmptyReferer,
    TooManyAttempts,
    ReachedLimitDay,
    ReachedLimitHour,
    ReachedLimitMinute,
    ReachedLimitSecond,
    StorageUnavailable,
    ComponentIp,
    ComponentRdns,
    ComponentHeader,
    ComponentUserAgent,
    ComponentTrustedBot,
    ChallengeSolved,
    IsSearchEngine,
}

impl ReasonCode {
    const ALL: [ReasonCode; 18] = [
        ReasonCode::ManualBan,
        ReasonCode::TooManySessions,
        ReasonCode::TooManyAccesses,
        ReasonCode::EmptyJsCookie,
        ReasonCode::EmptyReferer,
        ReasonCode::TooManyAttempts,
        ReasonCode::ReachedLimitDay,
        ReasonCode::ReachedLimitHour,
        ReasonCode::ReachedLimitMinute,
        ReasonCode::ReachedLimitSecond,
        ReasonCode::StorageUnavailable,
        ReasonCode::ComponentIp,
        ReasonCode::ComponentRdns,
        ReasonCode::ComponentHeader,
        ReasonCode::ComponentUserAgent,
        ReasonCode::ComponentTrustedBot,
        ReasonCode::ChallengeSolved,
        ReasonCode::IsSearchEngine,
    ];

    pub fn code(self) -> u16 {
        match self {
            ReasonCode::ManualBan => 1,
            ReasonCode::TooManySessions => 2,
            ReasonCode::TooManyAccesses => 3,
            ReasonCode::EmptyJsCookie => 4,
            ReasonCode::EmptyReferer => 5,
            ReasonCode::TooManyAttempts => 6,
            ReasonCode::ReachedLimitDay => 11,
            ReasonCode::ReachedLimitHour => 12,
            ReasonCode::ReachedLimitMinute => 13,
            ReasonCode::ReachedLimitSecond => 14,
            ReasonCode::StorageUnavailable => 50,
            ReasonCode::ComponentIp => 81,
            ReasonCode::ComponentRdns => 82,
            ReasonCode::ComponentHeader => 83,
            ReasonCode::ComponentUserAgent => 84,
            ReasonCode::ComponentTrustedBot => 85,
            ReasonCode::ChallengeSolved => 91,
            ReasonCode::IsSearchEngine => 100,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        ReasonCode::ALL.into_iter().find(|r| r.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::ManualBan => "manual_ban",
            ReasonCode::TooManySessions => "too_many_sessions",
            ReasonCode::TooManyAccesses => "too_many_accesses",
            ReasonCode::EmptyJsCookie => "empty_js_cookie",
            ReasonCode::EmptyReferer => "empty_referer",
            ReasonCode::TooManyAttempts => "too_many_attempts",
            ReasonCode::ReachedLimitDay => "reached_limit_day",
            ReasonCode::ReachedLimitHour => "reached_limit_hour",
            ReasonCode::ReachedLimitMinute => "reached_limit_minute",
            ReasonCode::ReachedLimitSecond => "reached_limit_second",
            ReasonCode::StorageUnavailable => "storage_unavailable",
            ReasonCode::ComponentIp => "component_ip",
            ReasonCode::ComponentRdns => "component_rdns",
            ReasonCode::ComponentHeader => "component_header",
            ReasonCode::ComponentUserAgent => "component_user_agent",
            ReasonCode::ComponentTrustedBot => "component_trusted_bot",
            ReasonCode::ChallengeSolved => "challenge_solved",
            ReasonCode::IsSearchEngine => "is_search_engine",
        }
    }

    /// Accepts the snake_case name or the numeric code.
    pub fn parse(input: &str) -> Result<Self, KernelError> {
        let invalid = || KernelError::InvalidReason(input.to_string());
        let token = normalize_code_token(input).ok_or_else(invalid)?;
        if let Ok(code) = token.parse::<u16>() {
            return ReasonCode::from_code(code).ok_or_else(invalid);
        }
        ReasonCode::ALL
            .into_iter()
            .find(|r| r.as_str() == token)
            .ok_or_else(invalid)
    }

    pub fn reached_limit(granularity: Granularity) -> Self {
        match granularity {
            Granularity::Second => ReasonCode::ReachedLimitSecond,
            Granularity::Minute => ReasonCode::ReachedLimitMinute,
            Granularity::Hour => ReasonCode::ReachedLimitHour,
            Granularity::Day => ReasonCode::ReachedLimitDay,
        }
    }

    pub fn for_flag(flag: FlagName) -> Self {
        match flag {
            FlagName::Session => ReasonCode::TooManySessions,
            FlagName::Referer => ReasonCode::EmptyReferer,
            FlagName::Cookie => ReasonCode::EmptyJsCookie,
        }
    }
}

impl From<ReasonCode> for u16 {
    fn from(reason: ReasonCode) -> u16 {
        reason.code()
    }
}

impl TryFrom<u16> for ReasonCode {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        ReasonCode::from_code(code).ok_or_else(|| format!("unknown reason code {}", code))
    }
}
