// src/components/header.rs

use super::Component;
use crate::codes::ReasonCode;
use crate::request::RequestContext;

/// Denies requests missing any header a real browser always sends.
#[derive(Debug, Clone)]
pub struct HeaderComponent {
    required: Vec<String>,
}

impl HeaderComponent {
    pub fn new<I, T>(required: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        HeaderComponent {
            required: required.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for HeaderComponent {
    fn default() -> Self {
        HeaderComponent::new(["accept", "accept-language", "accept-encoding"])
    }
}

impl Component for HeaderComponent {
    fn name(&self) -> &'static str {
        "header"
    }

    fn is_denied(&self, ctx: &dyn RequestContext) -> bool {
        self.required.iter().any(|name| {
            ctx.header(name)
                .map(|v| v.trim().is_empty())
                .unwrap_or(true)
        })
    }

    fn status_code(&self) -> ReasonCode {
        ReasonCode::ComponentHeader
    }
}
