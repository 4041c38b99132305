use super::*;
use crate::codes::ReasonCode;
use crate::enforcement::session_limit::SessionTicket;
use crate::test_support::header_value;

fn decision(verdict: Verdict, reason: Option<ReasonCode>) -> Decision {
    Decision {
        verdict,
        reason,
        challenge_required: false,
        session: None,
        degraded: false,
    }
}

fn body_text(resp: &Response) -> String {
    String::from_utf8_lossy(resp.body()).to_string()
}

#[test]
fn allow_is_plain_200() {
    let resp = decision_response(&decision(Verdict::Allow, None), None, &[]);
    assert_eq!(*resp.status(), 200u16);
    assert_eq!(header_value(&resp, "X-Gate-Verdict").as_deref(), Some("allow"));
    assert!(header_value(&resp, "X-Gate-Reason").is_none());
}

#[test]
fn deny_renders_block_page_with_reason_code() {
    let resp = decision_response(
        &decision(Verdict::Deny, Some(ReasonCode::ManualBan)),
        None,
        &[],
    );
    assert_eq!(*resp.status(), 403u16);
    assert_eq!(
        header_value(&resp, "X-Gate-Reason"),
        Some(ReasonCode::ManualBan.code().to_string())
    );
    assert!(body_text(&resp).contains("Access Blocked"));
}

#[test]
fn temporary_deny_prefers_challenge_form() {
    let mut d = decision(Verdict::TemporarilyDeny, Some(ReasonCode::ReachedLimitSecond));
    d.challenge_required = true;
    let resp = decision_response(&d, Some("<form id=\"pass\"></form>".to_string()), &[]);
    assert_eq!(*resp.status(), 403u16);
    assert!(body_text(&resp).contains("id=\"pass\""));

    d.challenge_required = false;
    let resp = decision_response(&d, Some("<form id=\"pass\"></form>".to_string()), &[]);
    assert!(!body_text(&resp).contains("id=\"pass\""));
}

#[test]
fn limit_shows_wait_number_and_retry_after() {
    let mut d = decision(Verdict::Limit, Some(ReasonCode::TooManyAccesses));
    d.session = Some(SessionTicket {
        session_id: "s3".to_string(),
        order: 3,
        position: 3,
        wait_number: 2,
        admitted: false,
        active: 3,
    });
    let resp = decision_response(&d, None, &[]);
    assert_eq!(*resp.status(), 503u16);
    assert_eq!(
        header_value(&resp, "Retry-After"),
        Some(RETRY_AFTER_SECONDS.to_string())
    );
    assert!(body_text(&resp).contains("<strong>2</strong>"));
}

#[test]
fn degraded_decision_is_flagged_and_extra_headers_pass_through() {
    let mut d = decision(Verdict::Allow, None);
    d.degraded = true;
    let extra = vec![(
        "Set-Cookie".to_string(),
        session_cookie("gate_session", "abc"),
    )];
    let resp = decision_response(&d, None, &extra);
    assert_eq!(header_value(&resp, "X-KV-Status").as_deref(), Some("unavailable"));
    assert_eq!(
        header_value(&resp, "Set-Cookie").as_deref(),
        Some("gate_session=abc; Path=/; HttpOnly; SameSite=Lax")
    );
}

#[test]
fn store_outage_follows_fail_mode() {
    let open = store_unavailable_response(FailMode::Open);
    assert_eq!(*open.status(), 200u16);
    assert_eq!(header_value(&open, "X-Gate-Fail-Mode").as_deref(), Some("open"));

    let closed = store_unavailable_response(FailMode::Closed);
    assert_eq!(*closed.status(), 503u16);
    assert_eq!(header_value(&closed, "X-KV-Status").as_deref(), Some("unavailable"));
}

#[test]
fn fail_mode_env_override_is_read() {
    let _lock = crate::test_support::lock_env();
    std::env::set_var("GATE_KV_STORE_FAIL_OPEN", "false");
    assert_eq!(fail_mode_from_env(), FailMode::Closed);
    std::env::set_var("GATE_KV_STORE_FAIL_OPEN", "nonsense");
    assert_eq!(fail_mode_from_env(), defaults().fail_mode);
    std::env::remove_var("GATE_KV_STORE_FAIL_OPEN");
}

#[test]
fn pass_submit_sets_cookie_and_redirects() {
    let challenge = SignedPassChallenge::new("test-secret").unwrap();
    let resp = handle_pass_submit(Some(&challenge), "203.0.113.7", true);
    assert_eq!(*resp.status(), 303u16);
    assert_eq!(header_value(&resp, "Location").as_deref(), Some("/"));
    let cookie = header_value(&resp, "Set-Cookie").unwrap();
    assert!(cookie.starts_with("gate_pass="));

    let resp = handle_pass_submit(None, "203.0.113.7", true);
    assert_eq!(*resp.status(), 404u16);
}

#[test]
fn pass_submit_refuses_visitor_without_temporary_ban() {
    let challenge = SignedPassChallenge::new("test-secret").unwrap();
    let resp = handle_pass_submit(Some(&challenge), "203.0.113.8", false);
    assert_eq!(*resp.status(), 403u16);
    assert!(header_value(&resp, "Set-Cookie").is_none());
}

fn cookie_filter_config() -> Config {
    let mut cfg = defaults().clone();
    cfg.filters.cookie = true;
    cfg.cookie_name = "gate_check".to_string();
    cfg.cookie_value = "ok".to_string();
    cfg
}

#[test]
fn allowed_visitor_receives_filter_cookie() {
    let cfg = cookie_filter_config();
    let allow = decision(Verdict::Allow, None);
    let fresh = VisitorRequest::new("198.51.100.3");
    let (name, value) = filter_cookie_header(&cfg, &fresh, &allow).unwrap();
    assert_eq!(name, "Set-Cookie");
    assert_eq!(value, "gate_check=ok; Path=/; SameSite=Lax");

    let extra = vec![(name, value)];
    let resp = decision_response(&allow, None, &extra);
    assert_eq!(
        header_value(&resp, "Set-Cookie").as_deref(),
        Some("gate_check=ok; Path=/; SameSite=Lax")
    );
}

#[test]
fn filter_cookie_is_skipped_when_present_denied_or_disabled() {
    let mut cfg = cookie_filter_config();
    let allow = decision(Verdict::Allow, None);

    let holder = VisitorRequest::new("198.51.100.4").with_cookie("gate_check", "ok");
    assert!(filter_cookie_header(&cfg, &holder, &allow).is_none());

    let stale = VisitorRequest::new("198.51.100.4").with_cookie("gate_check", "old");
    assert!(filter_cookie_header(&cfg, &stale, &allow).is_some());

    let fresh = VisitorRequest::new("198.51.100.5");
    let deny = decision(Verdict::TemporarilyDeny, Some(ReasonCode::EmptyJsCookie));
    assert!(filter_cookie_header(&cfg, &fresh, &deny).is_none());

    cfg.filters.cookie = false;
    assert!(filter_cookie_header(&cfg, &fresh, &allow).is_none());
}

#[test]
fn generated_session_ids_are_hex_and_distinct() {
    let a = new_session_id();
    let b = new_session_id();
    assert_eq!(a.len(), 32);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a, b);
}
