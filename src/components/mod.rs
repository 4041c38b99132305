// src/components/mod.rs
// Upstream allow/deny checks run by the kernel in configured order, before
// any counting happens.

mod header;
mod ip;
mod rdns;
mod trusted_bot;
mod user_agent;

pub use header::HeaderComponent;
pub use ip::IpComponent;
pub use rdns::RdnsComponent;
pub use trusted_bot::{TrustedBot, TrustedBotComponent};
pub use user_agent::UserAgentComponent;

use crate::codes::ReasonCode;
use crate::request::RequestContext;

pub trait Component: Send + Sync {
    fn name(&self) -> &'static str;

    /// True when this component alone is enough to ban the visitor.
    fn is_denied(&self, ctx: &dyn RequestContext) -> bool;

    /// True when this component vouches for the visitor. An allowed visitor
    /// skips every later stage.
    fn is_allowed(&self, _ctx: &dyn RequestContext) -> bool {
        false
    }

    /// Reason recorded on the ban this component causes.
    fn status_code(&self) -> ReasonCode;

    /// Reason reported on an allow decision this component makes.
    fn allow_reason(&self) -> Option<ReasonCode> {
        None
    }
}

/// Dot-bounded, case-insensitive suffix match: `crawl.example.com` matches
/// `example.com` and `.example.com` but `badexample.com` matches neither.
pub(crate) fn hostname_matches_suffix(hostname: &str, suffix: &str) -> bool {
    let host = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
    let suffix = suffix.trim().trim_start_matches('.').to_ascii_lowercase();
    if host.is_empty() || suffix.is_empty() {
        return false;
    }
    host == suffix || host.ends_with(&format!(".{}", suffix))
}

/// Entries may carry a trailing `# comment`.
pub(crate) fn strip_comment(entry: &str) -> &str {
    entry.split('#').next().unwrap_or("").trim()
}
