//! Member-facing message templates for the challenge lifecycle.
//!
//! Members always receive an explicit outcome: the challenge itself, success,
//! incorrect with remaining attempts, lockout, or expiry. Templates never
//! include internal scores or risk levels; those go to staff only (see
//! `gatekeeper::alert`).

use crate::member::MemberId;

/// Challenge message for button mode; the interactive affordance is attached
/// by the delivery layer.
pub fn msg_challenge_button(community_name: &str) -> String {
    format!(
        "👋 Welcome to {}!\n\n\
         To unlock the community, press the Verify button below.\n\
         The button expires after a short while, so please verify soon.",
        community_name
    )
}

/// Challenge message for code mode, with the secret embedded.
pub fn msg_challenge_code(community_name: &str, code: &str, expires_minutes: u64) -> String {
    format!(
        "👋 Welcome to {}!\n\n\
         To unlock the community, reply with this verification code:\n\n\
         {}\n\n\
         The code expires in {} minutes.",
        community_name, code, expires_minutes
    )
}

/// Challenge message for web mode, carrying the review link.
pub fn msg_challenge_web(community_name: &str, review_url: &str) -> String {
    format!(
        "👋 Welcome to {}!\n\n\
         This community requires a short review before you can participate.\n\
         Please complete verification here:\n\n\
         {}\n\n\
         A staff member will confirm your access shortly after.",
        community_name, review_url
    )
}

/// Visible in-community fallback when private delivery fails.
pub fn msg_fallback_mention(member: MemberId) -> String {
    format!(
        "@{} — we couldn't reach you by private message. \
         Please check this channel for your verification instructions.",
        member
    )
}

pub fn msg_success() -> String {
    "✅ Verification complete!\n\nYou now have full access to the community. Welcome!"
        .to_string()
}

pub fn msg_incorrect(remaining: u32) -> String {
    format!(
        "❌ That code doesn't match.\n\n\
         You have {} attempt{} remaining.",
        remaining,
        if remaining == 1 { "" } else { "s" }
    )
}

pub fn msg_lockout() -> String {
    "🔒 Verification locked.\n\n\
     Too many incorrect attempts. Please contact the community staff to proceed."
        .to_string()
}

pub fn msg_expired() -> String {
    "⏱️ Verification expired.\n\n\
     Your challenge timed out. Rejoin the community or ask staff for a new one."
        .to_string()
}

pub fn msg_review_denied() -> String {
    "🔒 Verification declined.\n\n\
     Staff reviewed your request and did not approve access at this time."
        .to_string()
}

/// Generic failure for unexpected errors in the response path; never leaves
/// a responder unacknowledged.
pub fn msg_generic_failure() -> String {
    "⚠️ Something went wrong processing your response. Please try again in a moment."
        .to_string()
}
