// src/challenge/mod.rs
// Challenges offered to temporarily banned visitors. Solving one lifts the
// temporary ban on the next request; each proof lifts at most one ban.

mod render;
mod token;

pub use render::{render_challenge_form, PASS_PATH};
pub use token::{ChallengeError, PassToken, SignedPassChallenge};

use crate::request::RequestContext;

/// Evidence that a visitor solved a challenge. The kernel spends `id` once;
/// the same proof presented again is ignored until `valid_until`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeProof {
    pub id: String,
    pub valid_until: u64,
}

pub trait ChallengeProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// The proof this request carries, if it is authentic and unexpired.
    fn response(&self, ctx: &dyn RequestContext, now: u64) -> Option<ChallengeProof>;

    /// HTML fragment shown to a temporarily banned visitor.
    fn form(&self) -> String;
}

#[cfg(test)]
mod tests;
