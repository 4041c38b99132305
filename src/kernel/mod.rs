// src/kernel/mod.rs
// Decision orchestrator: one pass per request through rules, excluded paths,
// components, rate windows, anomaly flags and the waiting room.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::action_log::{ActionLogEntry, ActionLogger, KvActionLog};
use crate::challenge::ChallengeProvider;
use crate::codes::{ReasonCode, RuleAction, Verdict};
use crate::components::Component;
use crate::config::{Config, FailMode};
use crate::enforcement::behavior::{check_behavior, BehaviorSignals};
use crate::enforcement::rate::{check_frequency, current_usage};
use crate::enforcement::rules::{RuleEntry, RuleStore};
use crate::enforcement::session_limit::{SessionLimiter, SessionTicket};
use crate::error::KernelError;
use crate::input_validation::parse_ip_addr;
use crate::request::RequestContext;
use crate::storage::{Deadline, Driver, KeyValueStore, RecordKind};
use crate::visitor::{Granularity, VisitorRecord};

/// Scope under which spent challenge proofs are remembered.
const CHALLENGE_PROOF_SCOPE: &str = "challenge_proof";

pub fn now_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: Option<ReasonCode>,
    /// A challenge provider is configured and solving it lifts the ban.
    pub challenge_required: bool,
    pub session: Option<SessionTicket>,
    /// Produced by the fail mode rather than by evaluation.
    pub degraded: bool,
}

impl Decision {
    fn new(verdict: Verdict, reason: Option<ReasonCode>) -> Self {
        Decision {
            verdict,
            reason,
            challenge_required: false,
            session: None,
            degraded: false,
        }
    }

    fn allow() -> Self {
        Decision::new(Verdict::Allow, None)
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }
}

/// What an existing rule does to the current request.
enum RuleOverride {
    Decided(Decision),
    /// A solved challenge lifted a temporary ban; evaluation continues.
    Lifted,
}

pub struct Kernel<S> {
    config: Config,
    driver: Driver<S>,
    components: Vec<Box<dyn Component>>,
    challenge: Option<Box<dyn ChallengeProvider>>,
    action_log: Option<Box<dyn ActionLogger + Send + Sync>>,
}

impl<S: KeyValueStore> Kernel<S> {
    /// Refuses configurations that fail validation.
    pub fn new(config: Config, store: S) -> Result<Self, KernelError> {
        config.validate()?;
        let driver = Driver::new(store, config.channel.clone());
        Ok(Kernel {
            config,
            driver,
            components: Vec::new(),
            challenge: None,
            action_log: None,
        })
    }

    /// Components run in the order they are added.
    pub fn with_component(mut self, component: impl Component + 'static) -> Self {
        self.components.push(Box::new(component));
        self
    }

    pub fn with_challenge(mut self, provider: impl ChallengeProvider + 'static) -> Self {
        self.challenge = Some(Box::new(provider));
        self
    }

    /// Replaces the default log, which appends to the kernel's own store.
    pub fn with_action_logger(mut self, logger: impl ActionLogger + Send + Sync + 'static) -> Self {
        self.action_log = Some(Box::new(logger));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn driver(&self) -> &Driver<S> {
        &self.driver
    }

    fn rules(&self) -> RuleStore<'_, S> {
        RuleStore::new(&self.driver, self.config.temporary_ban_seconds)
    }

    fn limiter(&self) -> SessionLimiter<'_, S> {
        SessionLimiter::new(
            &self.driver,
            self.config.session_limit.count,
            self.config.session_limit.period,
        )
    }

    pub fn run(&self, ctx: &dyn RequestContext) -> Decision {
        self.run_at(ctx, now_ts())
    }

    /// Evaluates one request at `now`. Storage failures and deadline misses
    /// never surface; they resolve through the configured fail mode.
    pub fn run_at(&self, ctx: &dyn RequestContext, now: u64) -> Decision {
        let deadline = Deadline::new(self.config.driver_timeout_ms);
        match self.evaluate(ctx, now, &deadline) {
            Ok(decision) => {
                debug!(
                    ip = %ctx.ip(),
                    verdict = decision.verdict.as_str(),
                    reason = decision.reason.map(|r| r.code()),
                    "admission decision"
                );
                decision
            }
            Err(err) => self.fail_mode_decision(ctx, now, &err),
        }
    }

    fn fail_mode_decision(&self, ctx: &dyn RequestContext, now: u64, err: &KernelError) -> Decision {
        let verdict = match self.config.fail_mode {
            FailMode::Open => Verdict::Allow,
            FailMode::Closed => Verdict::TemporarilyDeny,
        };
        warn!(
            ip = %ctx.ip(),
            error = %err,
            fail_mode = self.config.fail_mode.as_str(),
            "storage failure; applying fail mode"
        );
        if verdict.is_deny_class() {
            self.record(
                ctx.ip(),
                ctx.session_id(),
                RuleAction::TemporarilyBan,
                ReasonCode::StorageUnavailable,
                now,
            );
        }
        Decision {
            degraded: true,
            ..Decision::new(verdict, Some(ReasonCode::StorageUnavailable))
        }
    }

    fn checkpoint(deadline: &Deadline) -> Result<(), KernelError> {
        if deadline.expired() {
            Err(KernelError::Timeout)
        } else {
            Ok(())
        }
    }

    fn evaluate(
        &self,
        ctx: &dyn RequestContext,
        now: u64,
        deadline: &Deadline,
    ) -> Result<Decision, KernelError> {
        let ip = ctx.ip();

        let mut challenge_solved = false;
        if let Some(rule) = self.rules().lookup(ip, now)? {
            match self.apply_rule_override(ctx, &rule, now)? {
                RuleOverride::Decided(decision) => return Ok(decision),
                RuleOverride::Lifted => challenge_solved = true,
            }
        }
        Self::checkpoint(deadline)?;

        if self.config.is_path_excluded(ctx.path()) {
            return Ok(Decision::allow());
        }

        let stored = self.driver.get::<VisitorRecord>(RecordKind::Filter, ip)?;
        let first_seen = stored.is_none();
        let mut visitor = stored.unwrap_or_else(|| VisitorRecord::first_seen(ip, now));
        if challenge_solved {
            visitor.reset_flags();
        }
        let hostname = ctx.resolved_hostname();
        if !hostname.is_empty() {
            visitor.resolved_hostname = hostname.to_string();
        }
        Self::checkpoint(deadline)?;

        let decision = self.screen(ctx, &mut visitor, first_seen, now, deadline)?;
        visitor.last_time = now;
        self.driver.save(
            RecordKind::Filter,
            ip,
            &visitor,
            self.visitor_ttl_seconds(),
            now,
        )?;
        Ok(decision)
    }

    fn apply_rule_override(
        &self,
        ctx: &dyn RequestContext,
        rule: &RuleEntry,
        now: u64,
    ) -> Result<RuleOverride, KernelError> {
        let ip = ctx.ip();
        match rule.rule_type {
            RuleAction::Allow => Ok(RuleOverride::Decided(Decision::new(
                Verdict::Allow,
                Some(rule.reason),
            ))),
            // Unban entries are never persisted.
            RuleAction::Ban | RuleAction::Unban => {
                self.record(ip, ctx.session_id(), RuleAction::Ban, rule.reason, now);
                Ok(RuleOverride::Decided(Decision::new(
                    Verdict::Deny,
                    Some(rule.reason),
                )))
            }
            RuleAction::TemporarilyBan => {
                if let Some(challenge) = &self.challenge {
                    let fresh = match challenge.response(ctx, now) {
                        Some(proof) => self.driver.claim_once(
                            CHALLENGE_PROOF_SCOPE,
                            &proof.id,
                            proof.valid_until,
                            now,
                        )?,
                        None => false,
                    };
                    if fresh {
                        self.rules()
                            .apply(RuleAction::Unban, ReasonCode::ChallengeSolved, ip, now)?;
                        self.record(
                            ip,
                            ctx.session_id(),
                            RuleAction::Unban,
                            ReasonCode::ChallengeSolved,
                            now,
                        );
                        info!(ip = %ip, provider = challenge.name(), "challenge solved; ban lifted");
                        return Ok(RuleOverride::Lifted);
                    }
                }

                let limit = self.config.deny_attempts_limit;
                if limit > 0 {
                    let attempts = self
                        .rules()
                        .record_attempt(ip, now)?
                        .map(|e| e.attempts)
                        .unwrap_or(0);
                    if attempts > limit {
                        self.rules()
                            .apply(RuleAction::Ban, ReasonCode::TooManyAttempts, ip, now)?;
                        self.record(
                            ip,
                            ctx.session_id(),
                            RuleAction::Ban,
                            ReasonCode::TooManyAttempts,
                            now,
                        );
                        info!(ip = %ip, attempts, "temporary ban escalated");
                        return Ok(RuleOverride::Decided(Decision::new(
                            Verdict::Deny,
                            Some(ReasonCode::TooManyAttempts),
                        )));
                    }
                }

                self.record(
                    ip,
                    ctx.session_id(),
                    RuleAction::TemporarilyBan,
                    rule.reason,
                    now,
                );
                Ok(RuleOverride::Decided(self.temporary_deny(rule.reason)))
            }
        }
    }

    /// Components, rate windows, anomaly flags and the waiting room. Mutates
    /// `visitor`; the caller persists it.
    fn screen(
        &self,
        ctx: &dyn RequestContext,
        visitor: &mut VisitorRecord,
        first_seen: bool,
        now: u64,
        deadline: &Deadline,
    ) -> Result<Decision, KernelError> {
        let cfg = &self.config;
        let ip = ctx.ip();
        let session_id = ctx.session_id();

        for component in &self.components {
            if component.is_allowed(ctx) {
                debug!(ip = %ip, component = component.name(), "component allowed visitor");
                return Ok(Decision::new(Verdict::Allow, component.allow_reason()));
            }
            if component.is_denied(ctx) {
                let reason = component.status_code();
                self.rules().apply(RuleAction::Ban, reason, ip, now)?;
                self.record(ip, session_id, RuleAction::Ban, reason, now);
                info!(ip = %ip, component = component.name(), "component denied visitor");
                return Ok(Decision::new(Verdict::Deny, Some(reason)));
            }
        }

        if cfg.filters.frequency {
            let outcome = check_frequency(visitor, &cfg.time_unit_quota, now);
            if let Some(granularity) = outcome.breached {
                let reason = ReasonCode::reached_limit(granularity);
                return self.impose_temporary_ban(ip, session_id, reason, now);
            }
        }

        let filters = cfg.filters;
        if filters.cookie || filters.session || filters.referer {
            let signals = BehaviorSignals {
                session_id,
                referer_present: ctx.referer_present(),
                cookie: ctx.cookie(&cfg.cookie_name),
                first_seen,
            };
            let outcome = check_behavior(visitor, &signals, cfg, now);
            if let Some(flag) = outcome.flag {
                let reason = ReasonCode::for_flag(flag);
                debug!(ip = %ip, flag = flag.as_str(), "unusual behavior threshold crossed");
                return self.impose_temporary_ban(ip, session_id, reason, now);
            }
        }
        Self::checkpoint(deadline)?;

        if cfg.session_limit.enabled() && !session_id.is_empty() {
            let ticket = self.limiter().admit(session_id, ip, now)?;
            let decision = if ticket.admitted {
                Decision::allow()
            } else {
                Decision::new(Verdict::Limit, Some(ReasonCode::TooManyAccesses))
            };
            return Ok(Decision {
                session: Some(ticket),
                ..decision
            });
        }

        Ok(Decision::allow())
    }

    fn impose_temporary_ban(
        &self,
        ip: &str,
        session_id: &str,
        reason: ReasonCode,
        now: u64,
    ) -> Result<Decision, KernelError> {
        self.rules()
            .apply(RuleAction::TemporarilyBan, reason, ip, now)?;
        self.record(ip, session_id, RuleAction::TemporarilyBan, reason, now);
        Ok(self.temporary_deny(reason))
    }

    fn temporary_deny(&self, reason: ReasonCode) -> Decision {
        Decision {
            challenge_required: self.challenge.is_some(),
            ..Decision::new(Verdict::TemporarilyDeny, Some(reason))
        }
    }

    fn visitor_ttl_seconds(&self) -> u64 {
        Granularity::Day
            .window_seconds()
            .max(self.config.time_reset_limit)
    }

    /// Appends to the action log. A failed write is logged and otherwise
    /// ignored; it never changes the decision.
    fn record(&self, ip: &str, session_id: &str, action: RuleAction, reason: ReasonCode, now: u64) {
        let entry = ActionLogEntry {
            ip: ip.to_string(),
            session_id: session_id.to_string(),
            action_code: action,
            reason_code: reason,
            timestamp: now,
        };
        let result = match &self.action_log {
            Some(logger) => logger.add(&entry),
            None => KvActionLog::new(self.driver.store(), self.config.channel.as_str()).add(&entry),
        };
        if let Err(err) = result {
            warn!(ip = %ip, error = %err, "action log write failed");
        }
    }

    /// The challenge form to show a temporarily banned visitor, if any.
    pub fn challenge_form(&self) -> Option<String> {
        self.challenge.as_ref().map(|c| c.form())
    }

    // Administrative operations.

    /// Applies a manual action given as admin-side strings, e.g.
    /// `("203.0.113.9", "temporarily_ban", "manual_ban")`.
    pub fn apply_manual_action(
        &self,
        ip: &str,
        action: &str,
        reason: &str,
    ) -> Result<Option<RuleEntry>, KernelError> {
        let ip = parse_ip_addr(ip).ok_or_else(|| KernelError::InvalidIp(ip.to_string()))?;
        let action = RuleAction::parse(action)?;
        let reason = ReasonCode::parse(reason)?;
        self.apply_rule(&ip, action, reason, now_ts())
    }

    pub fn apply_rule(
        &self,
        ip: &str,
        action: RuleAction,
        reason: ReasonCode,
        now: u64,
    ) -> Result<Option<RuleEntry>, KernelError> {
        let entry = self.rules().apply(action, reason, ip, now)?;
        self.record(ip, "", action, reason, now);
        Ok(entry)
    }

    pub fn ban(&self, ip: &str, now: u64) -> Result<Option<RuleEntry>, KernelError> {
        self.apply_rule(ip, RuleAction::Ban, ReasonCode::ManualBan, now)
    }

    pub fn unban(&self, ip: &str, now: u64) -> Result<(), KernelError> {
        self.apply_rule(ip, RuleAction::Unban, ReasonCode::ManualBan, now)?;
        Ok(())
    }

    /// The visitor's unexpired temporary ban, if any. Only such visitors are
    /// offered a challenge pass.
    pub fn active_temporary_ban(&self, ip: &str, now: u64) -> Result<Option<RuleEntry>, KernelError> {
        Ok(self
            .rules()
            .lookup(ip, now)?
            .filter(|rule| rule.rule_type == RuleAction::TemporarilyBan))
    }

    pub fn list_rules(&self, now: u64) -> Result<Vec<RuleEntry>, KernelError> {
        Ok(self.rules().list(now)?)
    }

    /// Forgets every visitor, rule and session of this channel.
    pub fn rebuild(&self) -> Result<(), KernelError> {
        self.driver.rebuild()?;
        info!(channel = %self.config.channel, "channel data rebuilt");
        Ok(())
    }

    /// Reclaims idle waiting-room sessions. Returns how many stay active.
    pub fn sweep_sessions(&self, now: u64) -> Result<u64, KernelError> {
        Ok(self.limiter().sweep(now)?)
    }

    pub fn release_session(&self, session_id: &str) -> Result<bool, KernelError> {
        Ok(self.limiter().release(session_id)?)
    }

    pub fn session_status(
        &self,
        session_id: &str,
        now: u64,
    ) -> Result<Option<SessionTicket>, KernelError> {
        Ok(self.limiter().status(session_id, now)?)
    }

    pub fn active_sessions(&self, now: u64) -> Result<u64, KernelError> {
        Ok(self.limiter().active_count(now)?)
    }

    pub fn visitor_snapshot(&self, ip: &str) -> Result<Option<VisitorRecord>, KernelError> {
        Ok(self.driver.get::<VisitorRecord>(RecordKind::Filter, ip)?)
    }

    /// Pageviews per window for `ip` as of `now`; elapsed windows read 0.
    pub fn usage(&self, ip: &str, now: u64) -> Result<Vec<(Granularity, u32)>, KernelError> {
        let Some(visitor) = self.visitor_snapshot(ip)? else {
            return Ok(Granularity::ALL.iter().map(|g| (*g, 0)).collect());
        };
        Ok(Granularity::ALL
            .iter()
            .map(|g| (*g, current_usage(&visitor, *g, now)))
            .collect())
    }
}
