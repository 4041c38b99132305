// src/components/rdns.rs

use super::{hostname_matches_suffix, strip_comment, Component};
use crate::codes::ReasonCode;
use crate::request::RequestContext;

/// Denies visitors whose reverse-DNS hostname falls under a listed domain.
/// In strict mode a visitor without a resolved hostname is denied too.
#[derive(Debug, Clone, Default)]
pub struct RdnsComponent {
    denied_suffixes: Vec<String>,
    strict: bool,
}

impl RdnsComponent {
    pub fn new<I, T>(denied_suffixes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        RdnsComponent {
            denied_suffixes: denied_suffixes.into_iter().map(Into::into).collect(),
            strict: false,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl Component for RdnsComponent {
    fn name(&self) -> &'static str {
        "rdns"
    }

    fn is_denied(&self, ctx: &dyn RequestContext) -> bool {
        let hostname = ctx.resolved_hostname().trim();
        if hostname.is_empty() {
            return self.strict;
        }
        self.denied_suffixes
            .iter()
            .map(|s| strip_comment(s))
            .any(|suffix| hostname_matches_suffix(hostname, suffix))
    }

    fn status_code(&self) -> ReasonCode {
        ReasonCode::ComponentRdns
    }
}
