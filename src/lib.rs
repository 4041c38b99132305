// src/lib.rs
// Entry point for the admission gate Spin app

use spin_sdk::http::{Request, Response};
#[cfg(target_arch = "wasm32")]
use spin_sdk::http_component;

pub mod action_log; // Append-only log of deny-class decisions
pub mod challenge;  // Signed pass-token challenge for temporary bans
pub mod codes;      // Verdicts, rule actions and reason codes
pub mod components; // Pluggable request classifiers (IP, rDNS, headers, UA, bots)
pub mod config;     // Config loading and defaults
pub mod enforcement; // Rules, rate windows, behavior flags, waiting room
pub mod error;
pub mod http;       // Spin request/response glue
mod input_validation;
pub mod kernel;     // Decision orchestrator and admin operations
pub mod request;    // Request abstraction
pub mod storage;    // KV driver, record envelopes, indexes
pub mod visitor;    // Per-IP visitor record

#[cfg(test)]
mod test_support;

pub use action_log::{ActionLogEntry, ActionLogger, KvActionLog, MemoryActionLog};
pub use challenge::{ChallengeError, ChallengeProof, ChallengeProvider, SignedPassChallenge};
pub use codes::{ReasonCode, RuleAction, Verdict};
pub use components::{
    Component, HeaderComponent, IpComponent, RdnsComponent, TrustedBot, TrustedBotComponent,
    UserAgentComponent,
};
pub use config::{Config, FailMode};
pub use enforcement::rules::RuleEntry;
pub use enforcement::session_limit::SessionTicket;
pub use error::KernelError;
pub use kernel::{now_ts, Decision, Kernel};
pub use request::{RequestContext, VisitorRequest};
pub use storage::{Driver, InMemoryStore, KeyValueStore, StoreError};
pub use visitor::{Granularity, VisitorRecord};

/// Main HTTP handler. Invoked by Spin for every request.
#[cfg_attr(target_arch = "wasm32", http_component)]
pub fn spin_entrypoint(req: Request) -> Response {
    http::handle_admission_impl(&req)
}
