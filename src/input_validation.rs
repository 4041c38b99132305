// src/input_validation.rs
// Normalization for values arriving from the admin side (manual rule actions).

use std::net::IpAddr;

pub const MAX_CODE_TOKEN_LEN: usize = 32;

/// Canonical textual form of an IP address, or None if it does not parse.
pub fn parse_ip_addr(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<IpAddr>().ok().map(|addr| addr.to_string())
}

/// Lowercased snake_case token for action / reason names. Dashes and spaces
/// fold to underscores.
pub fn normalize_code_token(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_CODE_TOKEN_LEN {
        return None;
    }
    let normalized: String = trimmed
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect();
    if normalized
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Some(normalized)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ip_addr_canonicalizes() {
        assert_eq!(parse_ip_addr(" 10.0.0.1 ").as_deref(), Some("10.0.0.1"));
        assert_eq!(
            parse_ip_addr("2001:0db8:0000:0000:0000:0000:0000:0001").as_deref(),
            Some("2001:db8::1")
        );
        assert_eq!(parse_ip_addr("not-an-ip"), None);
        assert_eq!(parse_ip_addr(""), None);
    }

    #[test]
    fn normalize_code_token_folds_case_and_separators() {
        assert_eq!(
            normalize_code_token("Temporarily-Ban").as_deref(),
            Some("temporarily_ban")
        );
        assert_eq!(normalize_code_token("14").as_deref(), Some("14"));
        assert_eq!(normalize_code_token("ban;drop"), None);
        assert_eq!(normalize_code_token(&"x".repeat(40)), None);
    }
}
