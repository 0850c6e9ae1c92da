//! Member and community identifiers, plus the join-event payload.
//!
//! All admission records are scoped by (community, member). Identifiers are
//! opaque numeric ids assigned by the chat platform; Narthex never interprets
//! them beyond equality and display.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Community (guild/server) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommunityId(pub u64);

/// Member identifier, unique within the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(pub u64);

/// Role identifier within a community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleId(pub u64);

impl fmt::Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable attributes of a member at join time.
///
/// Ephemeral: supplied by the join event, never stored as-is. The persisted
/// artifact derived from it is the `RiskAssessment`.
#[derive(Debug, Clone)]
pub struct Member {
    pub community: CommunityId,
    pub member: MemberId,
    /// Account creation time (Unix seconds), from the platform profile.
    pub account_created_at: u64,
    /// Whether the account has set a custom avatar.
    pub has_avatar: bool,
    /// Number of communities this member already shares with the bot.
    pub mutual_communities: u32,
    /// Roles already held at join time (relevant for whitelist bypass).
    pub roles: Vec<RoleId>,
}

impl Member {
    /// Whole days since account creation, as seen at `now`.
    ///
    /// An account created "in the future" (clock skew between platform and
    /// host) counts as zero days old, i.e. maximally new.
    pub fn account_age_days(&self, now: u64) -> u32 {
        now.saturating_sub(self.account_created_at)
            .checked_div(SECONDS_PER_DAY)
            .unwrap_or(0) as u32
    }
}
