// src/challenge/token.rs
// HMAC-SHA256 pass token: base64(payload JSON) "." base64(signature),
// bound to the visitor IP, valid until `expires_at` and identified by a
// random nonce so it can be spent once.

use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use super::{render_challenge_form, ChallengeProof, ChallengeProvider, PASS_PATH};
use crate::request::RequestContext;

pub const DEFAULT_PASS_COOKIE: &str = "gate_pass";
const DEFAULT_TTL_SECONDS: u64 = 600;
const SECRET_ENV: &str = "GATE_CHALLENGE_SECRET";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    #[error("challenge secret must not be empty")]
    EmptySecret,
    #[error("challenge secret rejected by hmac")]
    InvalidKey,
    #[error("pass token missing payload or signature")]
    Malformed,
    #[error("pass token is not valid base64")]
    InvalidEncoding,
    #[error("pass token signature mismatch")]
    SignatureMismatch,
    #[error("pass token payload is not valid JSON")]
    InvalidPayload,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PassToken {
    pub ip: String,
    pub nonce: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

#[derive(Clone)]
pub struct SignedPassChallenge {
    secret: Vec<u8>,
    cookie_name: String,
    ttl_seconds: u64,
}

impl std::fmt::Debug for SignedPassChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedPassChallenge")
            .field("cookie_name", &self.cookie_name)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl SignedPassChallenge {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, ChallengeError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(ChallengeError::EmptySecret);
        }
        Ok(SignedPassChallenge {
            secret: secret.to_vec(),
            cookie_name: DEFAULT_PASS_COOKIE.to_string(),
            ttl_seconds: DEFAULT_TTL_SECONDS,
        })
    }

    /// Built from `GATE_CHALLENGE_SECRET`; None when it is unset or blank.
    pub fn from_env() -> Option<Self> {
        match std::env::var(SECRET_ENV) {
            Ok(secret) if !secret.trim().is_empty() => SignedPassChallenge::new(secret.trim()).ok(),
            _ => None,
        }
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    fn mac(&self) -> Result<Hmac<Sha256>, ChallengeError> {
        Hmac::<Sha256>::new_from_slice(&self.secret).map_err(|_| ChallengeError::InvalidKey)
    }

    /// Issues a pass token for `ip`, valid for the configured TTL.
    pub fn issue(&self, ip: &str, now: u64) -> Result<String, ChallengeError> {
        let payload = PassToken {
            ip: ip.to_string(),
            nonce: format!("{:016x}{:016x}", rand::random::<u64>(), rand::random::<u64>()),
            issued_at: now,
            expires_at: now.saturating_add(self.ttl_seconds),
        };
        let payload_json =
            serde_json::to_string(&payload).map_err(|_| ChallengeError::InvalidPayload)?;
        let mut mac = self.mac()?;
        mac.update(payload_json.as_bytes());
        let sig = mac.finalize().into_bytes();
        Ok(format!(
            "{}.{}",
            general_purpose::STANDARD.encode(payload_json.as_bytes()),
            general_purpose::STANDARD.encode(sig)
        ))
    }

    /// Decodes and authenticates a token. Does not check IP or expiry.
    pub fn parse(&self, token: &str) -> Result<PassToken, ChallengeError> {
        let (payload_b64, sig_b64) = token.split_once('.').ok_or(ChallengeError::Malformed)?;
        let payload_bytes = general_purpose::STANDARD
            .decode(payload_b64.as_bytes())
            .map_err(|_| ChallengeError::InvalidEncoding)?;
        let sig = general_purpose::STANDARD
            .decode(sig_b64.as_bytes())
            .map_err(|_| ChallengeError::InvalidEncoding)?;
        let mut mac = self.mac()?;
        mac.update(&payload_bytes);
        mac.verify_slice(&sig)
            .map_err(|_| ChallengeError::SignatureMismatch)?;
        serde_json::from_slice::<PassToken>(&payload_bytes).map_err(|_| ChallengeError::InvalidPayload)
    }

    /// The authenticated token when it belongs to `ip` and has not expired.
    pub fn verify(&self, token: &str, ip: &str, now: u64) -> Option<PassToken> {
        match self.parse(token) {
            Ok(pass) if pass.ip == ip && now < pass.expires_at => Some(pass),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "rejected pass token");
                None
            }
        }
    }

    /// Set-Cookie value carrying a freshly issued pass token.
    pub fn pass_cookie(&self, ip: &str, now: u64) -> Result<String, ChallengeError> {
        let token = self.issue(ip, now)?;
        Ok(format!(
            "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
            self.cookie_name, token, self.ttl_seconds
        ))
    }
}

impl ChallengeProvider for SignedPassChallenge {
    fn name(&self) -> &'static str {
        "signed_pass"
    }

    fn response(&self, ctx: &dyn RequestContext, now: u64) -> Option<ChallengeProof> {
        let token = ctx.cookie(&self.cookie_name)?;
        self.verify(token, ctx.ip(), now).map(|pass| ChallengeProof {
            id: pass.nonce,
            valid_until: pass.expires_at,
        })
    }

    fn form(&self) -> String {
        render_challenge_form(PASS_PATH)
    }
}
