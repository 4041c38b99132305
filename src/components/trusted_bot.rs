// src/components/trusted_bot.rs
// Search-engine crawlers: a matching User-Agent token is only trusted when the
// reverse-DNS hostname belongs to the crawler's operator.

use super::{hostname_matches_suffix, Component};
use crate::codes::ReasonCode;
use crate::request::RequestContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedBot {
    pub ua_token: String,
    pub hostname_suffixes: Vec<String>,
}

impl TrustedBot {
    pub fn new(ua_token: &str, hostname_suffixes: &[&str]) -> Self {
        TrustedBot {
            ua_token: ua_token.to_ascii_lowercase(),
            hostname_suffixes: hostname_suffixes.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn claims(&self, user_agent: &str) -> bool {
        !self.ua_token.is_empty() && user_agent.to_ascii_lowercase().contains(&self.ua_token)
    }

    fn verified(&self, hostname: &str) -> bool {
        self.hostname_suffixes
            .iter()
            .any(|suffix| hostname_matches_suffix(hostname, suffix))
    }
}

#[derive(Debug, Clone)]
pub struct TrustedBotComponent {
    bots: Vec<TrustedBot>,
}

impl TrustedBotComponent {
    pub fn new(bots: Vec<TrustedBot>) -> Self {
        TrustedBotComponent { bots }
    }

    pub fn add(mut self, bot: TrustedBot) -> Self {
        self.bots.push(bot);
        self
    }

    fn claimed<'a>(&'a self, ctx: &dyn RequestContext) -> Option<&'a TrustedBot> {
        let ua = ctx.user_agent();
        self.bots.iter().find(|bot| bot.claims(ua))
    }
}

impl Default for TrustedBotComponent {
    fn default() -> Self {
        TrustedBotComponent::new(vec![
            TrustedBot::new("googlebot", &["googlebot.com", "google.com"]),
            TrustedBot::new("bingbot", &["search.msn.com"]),
            TrustedBot::new("yandexbot", &["yandex.com", "yandex.ru", "yandex.net"]),
            TrustedBot::new("baiduspider", &["crawl.baidu.com"]),
            TrustedBot::new("applebot", &["applebot.apple.com"]),
        ])
    }
}

impl Component for TrustedBotComponent {
    fn name(&self) -> &'static str {
        "trusted_bot"
    }

    fn is_allowed(&self, ctx: &dyn RequestContext) -> bool {
        self.claimed(ctx)
            .map(|bot| bot.verified(ctx.resolved_hostname()))
            .unwrap_or(false)
    }

    /// A crawler token from a host the crawler does not own is a fake bot.
    fn is_denied(&self, ctx: &dyn RequestContext) -> bool {
        self.claimed(ctx)
            .map(|bot| !bot.verified(ctx.resolved_hostname()))
            .unwrap_or(false)
    }

    fn status_code(&self) -> ReasonCode {
        ReasonCode::ComponentTrustedBot
    }

    fn allow_reason(&self) -> Option<ReasonCode> {
        Some(ReasonCode::IsSearchEngine)
    }
}
