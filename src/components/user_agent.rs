// src/components/user_agent.rs

use super::Component;
use crate::codes::ReasonCode;
use crate::request::RequestContext;

const DEFAULT_DENIED_AGENTS: &[&str] = &[
    "curl",
    "wget",
    "python-requests",
    "go-http-client",
    "scrapy",
    "httpclient",
    "libwww-perl",
];

/// Case-insensitive substring deny list over the User-Agent header. Strict
/// mode also denies an empty User-Agent.
#[derive(Debug, Clone)]
pub struct UserAgentComponent {
    denied: Vec<String>,
    strict: bool,
}

impl UserAgentComponent {
    pub fn new<I, T>(denied: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        UserAgentComponent {
            denied: denied
                .into_iter()
                .map(|d| d.into().to_ascii_lowercase())
                .filter(|d| !d.trim().is_empty())
                .collect(),
            strict: false,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl Default for UserAgentComponent {
    fn default() -> Self {
        UserAgentComponent::new(DEFAULT_DENIED_AGENTS.iter().copied())
    }
}

impl Component for UserAgentComponent {
    fn name(&self) -> &'static str {
        "user_agent"
    }

    fn is_denied(&self, ctx: &dyn RequestContext) -> bool {
        let ua = ctx.user_agent().trim();
        if ua.is_empty() {
            return self.strict;
        }
        let normalized = ua.to_ascii_lowercase();
        self.denied.iter().any(|needle| normalized.contains(needle.as_str()))
    }

    fn status_code(&self) -> ReasonCode {
        ReasonCode::ComponentUserAgent
    }
}
