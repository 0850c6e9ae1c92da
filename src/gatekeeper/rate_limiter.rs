//! Action cooldown for interactive responses.
//!
//! Guards against a single human action being processed twice (duplicate
//! rapid clicks on the same approve/deny affordance). One fixed cooldown per
//! (community, member, action); the first allowed call records, subsequent
//! calls within the window are limited.
//!
//! State is process-local and resets on restart; it self-prunes above a size
//! threshold instead of growing unbounded.

use crate::clock::Clock;
use crate::member::{CommunityId, MemberId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Default cooldown per (pair, action) in seconds.
pub const DEFAULT_ACTION_COOLDOWN_SECS: u64 = 10;

/// Lazy-eviction threshold for the cooldown map.
const MAX_ENTRIES: usize = 1_000;

/// Interactive actions subject to the cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateAction {
    /// Member clicked the challenge affordance.
    ChallengeClick,
    /// Staff approved or denied a web-mode review.
    ReviewDecision,
}

impl GateAction {
    pub fn name(&self) -> &'static str {
        match self {
            GateAction::ChallengeClick => "challenge_click",
            GateAction::ReviewDecision => "review_decision",
        }
    }
}

/// Per-action cooldown limiter.
#[derive(Clone)]
pub struct ActionRateLimiter {
    clock: Arc<dyn Clock>,
    cooldown_secs: u64,
    /// (community, member, action) -> last allowed call (Unix seconds).
    entries: Arc<RwLock<HashMap<(CommunityId, MemberId, GateAction), u64>>>,
}

impl ActionRateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_cooldown(clock, DEFAULT_ACTION_COOLDOWN_SECS)
    }

    pub fn with_cooldown(clock: Arc<dyn Clock>, cooldown_secs: u64) -> Self {
        Self {
            clock,
            cooldown_secs,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Whether the action is currently rate limited.
    ///
    /// An allowed call records its own timestamp, so the first caller in a
    /// window wins and duplicates within `cooldown_secs` are suppressed.
    pub fn is_rate_limited(
        &self,
        community: CommunityId,
        member: MemberId,
        action: GateAction,
    ) -> bool {
        let now = self.clock.now_unix();
        let key = (community, member, action);
        let mut entries = self.entries.write().unwrap();

        if entries.len() > MAX_ENTRIES {
            let cooldown = self.cooldown_secs;
            entries.retain(|_, last| now.saturating_sub(*last) < cooldown);
        }

        if let Some(last) = entries.get(&key) {
            if now.saturating_sub(*last) < self.cooldown_secs {
                return true;
            }
        }

        entries.insert(key, now);
        false
    }
}
