// src/http/mod.rs
// Spin HTTP glue: build a kernel over the default KV store, evaluate the
// request and turn the decision into a response.

mod block_page;

pub use block_page::{render_block_page, BlockPage};

use once_cell::sync::Lazy;
use spin_sdk::http::{Method, Request, Response};
use spin_sdk::key_value::Store;
use tracing::{error, warn};

use crate::challenge::{SignedPassChallenge, PASS_PATH};
use crate::codes::Verdict;
use crate::config::{defaults, parse_fail_open_override, Config, ConfigLoadError, FailMode};
use crate::kernel::{now_ts, Decision, Kernel};
use crate::request::{RequestContext, VisitorRequest};

const CHANNEL_ENV: &str = "GATE_CHANNEL";
pub const RETRY_AFTER_SECONDS: u64 = 10;

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
});

fn channel_from_env() -> String {
    std::env::var(CHANNEL_ENV)
        .ok()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| defaults().channel.clone())
}

fn fail_mode_from_env() -> FailMode {
    let raw = std::env::var("GATE_KV_STORE_FAIL_OPEN").ok();
    parse_fail_open_override(raw.as_deref()).unwrap_or(defaults().fail_mode)
}

/// Response used when the store cannot even be opened.
fn store_unavailable_response(mode: FailMode) -> Response {
    match mode {
        FailMode::Open => Response::builder()
            .status(200)
            .header("X-KV-Status", "unavailable")
            .header("X-Gate-Fail-Mode", mode.as_str())
            .body("OK (gate: store unavailable, checks bypassed)")
            .build(),
        FailMode::Closed => Response::builder()
            .status(503)
            .header("X-KV-Status", "unavailable")
            .header("X-Gate-Fail-Mode", mode.as_str())
            .header("Retry-After", RETRY_AFTER_SECONDS.to_string())
            .body("Service temporarily unavailable")
            .build(),
    }
}

fn new_session_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

fn session_cookie(name: &str, session_id: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", name, session_id)
}

/// Maps a decision to status, headers and body. `extra_headers` are appended
/// to every response (e.g. a freshly issued session cookie).
pub fn decision_response(
    decision: &Decision,
    challenge_form: Option<String>,
    extra_headers: &[(String, String)],
) -> Response {
    let (status, body) = match decision.verdict {
        Verdict::Allow => (200, "OK (admitted)".to_string()),
        Verdict::Deny => (403, render_block_page(BlockPage::Denied)),
        Verdict::TemporarilyDeny => {
            let body = match (decision.challenge_required, challenge_form) {
                (true, Some(form)) => form,
                _ => render_block_page(BlockPage::TemporarilyDenied),
            };
            (403, body)
        }
        Verdict::Limit => {
            let wait_number = decision
                .session
                .as_ref()
                .map(|t| t.wait_number)
                .unwrap_or(1);
            (503, render_block_page(BlockPage::Waiting { wait_number }))
        }
    };

    let mut builder = Response::builder();
    builder
        .status(status)
        .header("X-Gate-Verdict", decision.verdict.as_str());
    if decision.verdict != Verdict::Allow {
        builder.header("Content-Type", "text/html; charset=utf-8");
    }
    if let Some(reason) = decision.reason {
        builder.header("X-Gate-Reason", reason.code().to_string());
    }
    if decision.degraded {
        builder.header("X-KV-Status", "unavailable");
    }
    if decision.verdict == Verdict::Limit {
        builder.header("Retry-After", RETRY_AFTER_SECONDS.to_string());
    }
    for (name, value) in extra_headers {
        builder.header(name.as_str(), value.as_str());
    }
    builder.body(body).build()
}

/// Answers the challenge form: issues a pass cookie and sends the visitor
/// back to the site root. Only a visitor under an active temporary ban gets
/// one.
fn handle_pass_submit(
    challenge: Option<&SignedPassChallenge>,
    ip: &str,
    eligible: bool,
) -> Response {
    let Some(challenge) = challenge else {
        return Response::new(404, "Not Found");
    };
    if !eligible {
        return Response::new(403, "No active challenge");
    }
    match challenge.pass_cookie(ip, now_ts()) {
        Ok(cookie) => Response::builder()
            .status(303)
            .header("Location", "/")
            .header("Set-Cookie", cookie)
            .body("")
            .build(),
        Err(e) => {
            error!(error = %e, "failed to issue pass token");
            Response::new(500, "Challenge unavailable")
        }
    }
}

/// The cookie-filter value, set on admitted visitors that do not carry it yet.
fn filter_cookie_header(
    cfg: &Config,
    visitor: &dyn RequestContext,
    decision: &Decision,
) -> Option<(String, String)> {
    if !cfg.filters.cookie || decision.verdict != Verdict::Allow {
        return None;
    }
    if visitor.cookie(&cfg.cookie_name) == Some(cfg.cookie_value.as_str()) {
        return None;
    }
    Some((
        "Set-Cookie".to_string(),
        format!("{}={}; Path=/; SameSite=Lax", cfg.cookie_name, cfg.cookie_value),
    ))
}

/// Main handler logic, testable as a plain Rust function.
pub fn handle_admission_impl(req: &Request) -> Response {
    Lazy::force(&TRACING);

    let channel = channel_from_env();
    let store = match Store::open_default() {
        Ok(store) => store,
        Err(e) => {
            let mode = fail_mode_from_env();
            warn!(error = ?e, fail_mode = mode.as_str(), "key-value store unavailable");
            return store_unavailable_response(mode);
        }
    };

    let mut cfg = match Config::load_or_default(&store, &channel) {
        Ok(cfg) => cfg,
        Err(ConfigLoadError::StoreUnavailable) => {
            return store_unavailable_response(fail_mode_from_env());
        }
        Err(e) => {
            error!(channel = %channel, error = %e, "refusing to run on invalid config");
            return Response::new(500, e.to_string());
        }
    };
    cfg.apply_env_overrides();

    let challenge = SignedPassChallenge::from_env();
    let mut visitor = VisitorRequest::from_spin(req, &cfg.session_cookie_name);

    let mut kernel = match Kernel::new(cfg, store) {
        Ok(kernel) => kernel,
        Err(e) => {
            error!(channel = %channel, error = %e, "refusing to run on invalid config");
            return Response::new(500, e.to_string());
        }
    };
    if let Some(challenge) = challenge.clone() {
        kernel = kernel.with_challenge(challenge);
    }

    if req.path() == PASS_PATH && *req.method() == Method::Post {
        let eligible = match kernel.active_temporary_ban(visitor.ip(), now_ts()) {
            Ok(rule) => rule.is_some(),
            Err(e) => {
                warn!(ip = %visitor.ip(), error = %e, "rule lookup failed; refusing pass");
                false
            }
        };
        return handle_pass_submit(challenge.as_ref(), visitor.ip(), eligible);
    }

    let mut extra_headers = Vec::new();
    if visitor.session_id().is_empty() {
        let session_id = new_session_id();
        extra_headers.push((
            "Set-Cookie".to_string(),
            session_cookie(&kernel.config().session_cookie_name, &session_id),
        ));
        visitor = visitor.with_session(session_id);
    }

    let decision = kernel.run(&visitor);
    extra_headers.extend(filter_cookie_header(kernel.config(), &visitor, &decision));
    decision_response(&decision, kernel.challenge_form(), &extra_headers)
}

#[cfg(test)]
mod tests;
