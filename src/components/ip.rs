// src/components/ip.rs
// Exact-address and CIDR allow/deny lists.

use std::net::IpAddr;

use ipnet::IpNet;

use super::{strip_comment, Component};
use crate::codes::ReasonCode;
use crate::request::RequestContext;

/// Allow entries win over deny entries for the same address.
#[derive(Debug, Clone, Default)]
pub struct IpComponent {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl IpComponent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow<I, T>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.allow.extend(entries.into_iter().map(Into::into));
        self
    }

    pub fn deny<I, T>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.deny.extend(entries.into_iter().map(Into::into));
        self
    }
}

/// True if `ip` matches any entry by exact address or CIDR range.
pub(crate) fn ip_in_list(ip: &str, list: &[String]) -> bool {
    let ip_addr: IpAddr = match ip.parse() {
        Ok(addr) => addr,
        Err(_) => return false,
    };
    for entry in list {
        let entry = strip_comment(entry);
        if entry.is_empty() {
            continue;
        }
        if let Ok(addr) = entry.parse::<IpAddr>() {
            if addr == ip_addr {
                return true;
            }
            continue;
        }
        if let Ok(net) = entry.parse::<IpNet>() {
            if net.contains(&ip_addr) {
                return true;
            }
        }
    }
    false
}

impl Component for IpComponent {
    fn name(&self) -> &'static str {
        "ip"
    }

    fn is_denied(&self, ctx: &dyn RequestContext) -> bool {
        !ip_in_list(ctx.ip(), &self.allow) && ip_in_list(ctx.ip(), &self.deny)
    }

    fn is_allowed(&self, ctx: &dyn RequestContext) -> bool {
        ip_in_list(ctx.ip(), &self.allow)
    }

    fn status_code(&self) -> ReasonCode {
        ReasonCode::ComponentIp
    }
}
