use super::*;
use crate::request::{RequestContext, VisitorRequest};

fn provider() -> SignedPassChallenge {
    SignedPassChallenge::new("unit-test-secret").unwrap().with_ttl(60)
}

#[test]
fn issued_token_verifies_for_same_ip_until_expiry() {
    let p = provider();
    let token = p.issue("1.2.3.4", 1_000).unwrap();
    assert!(p.verify(&token, "1.2.3.4", 1_000).is_some());
    assert!(p.verify(&token, "1.2.3.4", 1_059).is_some());
    assert!(p.verify(&token, "1.2.3.4", 1_060).is_none());
    assert!(p.verify(&token, "1.2.3.5", 1_010).is_none());
}

#[test]
fn every_issued_token_has_its_own_nonce() {
    let p = provider();
    let a = p.parse(&p.issue("1.2.3.4", 5).unwrap()).unwrap();
    let b = p.parse(&p.issue("1.2.3.4", 5).unwrap()).unwrap();
    assert_eq!(a.nonce.len(), 32);
    assert_ne!(a.nonce, b.nonce);
}

#[test]
fn token_from_other_secret_is_rejected() {
    let other = SignedPassChallenge::new("different").unwrap();
    let token = other.issue("1.2.3.4", 0).unwrap();
    assert_eq!(
        provider().parse(&token),
        Err(ChallengeError::SignatureMismatch)
    );
}

#[test]
fn malformed_tokens_are_rejected() {
    let p = provider();
    assert_eq!(p.parse("no-dot"), Err(ChallengeError::Malformed));
    assert_eq!(p.parse("!!!.???"), Err(ChallengeError::InvalidEncoding));
    assert!(p.verify("", "1.2.3.4", 0).is_none());
}

#[test]
fn empty_secret_is_refused() {
    assert_eq!(
        SignedPassChallenge::new("").unwrap_err(),
        ChallengeError::EmptySecret
    );
}

#[test]
fn response_reads_pass_cookie() {
    let p = provider().with_cookie_name("pass");
    let token = p.issue("9.9.9.9", 10).unwrap();
    let solved = VisitorRequest::new("9.9.9.9").with_cookie("pass", token.clone());
    let stolen = VisitorRequest::new("8.8.8.8").with_cookie("pass", token);
    let none = VisitorRequest::new("9.9.9.9");
    let proof = p.response(&solved, 20).unwrap();
    assert_eq!(proof.valid_until, 70);
    assert_eq!(proof.id, p.parse(solved.cookie("pass").unwrap()).unwrap().nonce);
    assert!(p.response(&stolen, 20).is_none());
    assert!(p.response(&none, 20).is_none());
}

#[test]
fn pass_cookie_carries_attributes() {
    let p = provider();
    let cookie = p.pass_cookie("1.2.3.4", 0).unwrap();
    assert!(cookie.starts_with("gate_pass="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.ends_with("Max-Age=60"));
}

#[test]
fn form_posts_to_pass_path() {
    let html = provider().form();
    assert!(html.contains(PASS_PATH));
    assert!(html.contains("method=\"POST\""));
}

#[test]
fn from_env_requires_secret() {
    let _lock = crate::test_support::lock_env();
    std::env::remove_var("GATE_CHALLENGE_SECRET");
    assert!(SignedPassChallenge::from_env().is_none());
    std::env::set_var("GATE_CHALLENGE_SECRET", "  ");
    assert!(SignedPassChallenge::from_env().is_none());
    std::env::set_var("GATE_CHALLENGE_SECRET", "s3cret");
    assert!(SignedPassChallenge::from_env().is_some());
    std::env::remove_var("GATE_CHALLENGE_SECRET");
}
