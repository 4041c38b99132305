// src/request.rs
// What the kernel needs to know about one incoming request.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};

use spin_sdk::http::Request;

/// Read-only view of a request. Header names are matched case-insensitively.
pub trait RequestContext {
    fn ip(&self) -> &str;
    /// Empty when the visitor has no session yet.
    fn session_id(&self) -> &str;
    fn cookie(&self, name: &str) -> Option<&str>;
    fn referer_present(&self) -> bool;
    fn header(&self, name: &str) -> Option<&str>;
    fn headers(&self) -> Vec<(&str, &str)>;
    fn path(&self) -> &str {
        "/"
    }
    fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }
    /// Reverse-DNS hostname when the host resolved it; empty otherwise.
    fn resolved_hostname(&self) -> &str {
        ""
    }
}

/// Owned request snapshot, built by hand or from a Spin request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitorRequest {
    ip: String,
    session_id: String,
    path: String,
    resolved_hostname: String,
    cookies: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
}

impl VisitorRequest {
    pub fn new(ip: impl Into<String>) -> Self {
        VisitorRequest {
            ip: ip.into(),
            path: "/".to_string(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_referer(self, value: impl Into<String>) -> Self {
        self.with_header("referer", value)
    }

    pub fn with_user_agent(self, value: impl Into<String>) -> Self {
        self.with_header("user-agent", value)
    }

    pub fn with_resolved_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.resolved_hostname = hostname.into();
        self
    }

    /// Snapshot of a Spin request. The session id comes from the
    /// `session_cookie_name` cookie, the IP from forwarded headers.
    pub fn from_spin(req: &Request, session_cookie_name: &str) -> Self {
        let mut out = VisitorRequest::new(extract_client_ip(req)).with_path(req.path());
        for (name, value) in req.headers() {
            if let Some(value) = value.as_str() {
                out.headers.insert(name.to_ascii_lowercase(), value.to_string());
            }
        }
        if let Some(raw) = out.headers.get("cookie").cloned() {
            out.cookies = parse_cookie_header(&raw);
        }
        if let Some(sid) = out.cookies.get(session_cookie_name) {
            out.session_id = sid.clone();
        }
        out
    }
}

impl RequestContext for VisitorRequest {
    fn ip(&self) -> &str {
        &self.ip
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    fn referer_present(&self) -> bool {
        self.header("referer")
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        self.headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn resolved_hostname(&self) -> &str {
        &self.resolved_hostname
    }
}

fn parse_cookie_header(raw: &str) -> BTreeMap<String, String> {
    let mut cookies = BTreeMap::new();
    for part in raw.split(';') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        let key = key.trim();
        if !key.is_empty() {
            cookies.insert(key.to_string(), value.trim().to_string());
        }
    }
    cookies
}

const FORWARDED_IP_SECRET_ENV: &str = "GATE_FORWARDED_IP_SECRET";
const FORWARDED_SECRET_HEADER: &str = "x-gate-forwarded-secret";

/// Forwarded IP headers count only when the proxy proves itself. With
/// GATE_FORWARDED_IP_SECRET set, X-Gate-Forwarded-Secret must match it.
fn forwarded_ip_trusted(req: &Request) -> bool {
    match std::env::var(FORWARDED_IP_SECRET_ENV) {
        Ok(secret) => req
            .header(FORWARDED_SECRET_HEADER)
            .and_then(|v| v.as_str())
            .map(|v| v == secret)
            .unwrap_or(false),
        Err(_) => true,
    }
}

fn usable_ip(raw: &str) -> Option<String> {
    let ip = raw.trim();
    (!ip.is_empty() && ip != "unknown").then(|| ip.to_string())
}

/// Peer address Spin reports for the connection, without the port.
fn peer_ip(req: &Request) -> Option<String> {
    let raw = req.header("spin-client-addr").and_then(|h| h.as_str())?.trim();
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Some(addr.ip().to_string());
    }
    raw.parse::<IpAddr>().ok().map(|ip| ip.to_string())
}

/// Best available client IP: first X-Forwarded-For hop, then X-Real-IP, both
/// only when trusted; otherwise the connection peer.
pub(crate) fn extract_client_ip(req: &Request) -> String {
    if forwarded_ip_trusted(req) {
        let forwarded = req
            .header("x-forwarded-for")
            .and_then(|h| h.as_str())
            .and_then(|val| val.split(',').next())
            .and_then(usable_ip)
            .or_else(|| {
                req.header("x-real-ip")
                    .and_then(|h| h.as_str())
                    .and_then(usable_ip)
            });
        if let Some(ip) = forwarded {
            return ip;
        }
    }
    peer_ip(req).unwrap_or_else(|| "unknown".to_string())
}
