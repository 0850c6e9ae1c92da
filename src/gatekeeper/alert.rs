//! Staff escalation throttling.
//!
//! Suppresses duplicate risk escalations for the same (community, member)
//! within a cooldown window unless the risk level got strictly worse. A
//! manual trust override at high trust suppresses escalation entirely: an
//! explicit "marked safe" wins over heuristic re-scoring.

use crate::admission::fusion::ScoreBreakdown;
use crate::clock::Clock;
use crate::member::{CommunityId, MemberId};
use crate::risk::{RiskLevel, RiskReason};
use crate::store::types::TrustRecord;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Default escalation cooldown in seconds (15 minutes).
pub const DEFAULT_ALERT_COOLDOWN_SECS: u64 = 900;

/// Manual-override trust at or above this suppresses escalations.
const OVERRIDE_TRUST_THRESHOLD: u8 = 70;

/// Lazy-eviction threshold for the cooldown map.
const MAX_ENTRIES: usize = 1_000;

#[derive(Debug, Clone, Copy)]
struct AlertCooldownEntry {
    last_alert: u64,
    last_level: RiskLevel,
}

/// Time+severity throttle on staff escalations.
#[derive(Clone)]
pub struct AlertThrottler {
    clock: Arc<dyn Clock>,
    cooldown_secs: u64,
    entries: Arc<RwLock<HashMap<(CommunityId, MemberId), AlertCooldownEntry>>>,
}

impl AlertThrottler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_cooldown(clock, DEFAULT_ALERT_COOLDOWN_SECS)
    }

    pub fn with_cooldown(clock: Arc<dyn Clock>, cooldown_secs: u64) -> Self {
        Self {
            clock,
            cooldown_secs,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Whether an escalation at `new_level` should reach staff.
    ///
    /// Suppressed when a prior alert for the pair fired within the cooldown
    /// and the level did not get strictly worse, or when the member carries
    /// a manual trust override at trust >= 70.
    pub fn should_alert(
        &self,
        community: CommunityId,
        member: MemberId,
        new_level: RiskLevel,
        trust: Option<&TrustRecord>,
    ) -> bool {
        if trust.is_some_and(|t| t.manual_override && t.trust_score >= OVERRIDE_TRUST_THRESHOLD) {
            return false;
        }

        let now = self.clock.now_unix();
        let entries = self.entries.read().unwrap();
        match entries.get(&(community, member)) {
            Some(entry) => {
                let within_cooldown = now.saturating_sub(entry.last_alert) < self.cooldown_secs;
                !within_cooldown || new_level > entry.last_level
            }
            None => true,
        }
    }

    /// Record a delivered escalation.
    pub fn record(&self, community: CommunityId, member: MemberId, level: RiskLevel) {
        let now = self.clock.now_unix();
        let mut entries = self.entries.write().unwrap();

        if entries.len() > MAX_ENTRIES {
            let cooldown = self.cooldown_secs;
            entries.retain(|_, e| now.saturating_sub(e.last_alert) < cooldown);
        }

        entries.insert(
            (community, member),
            AlertCooldownEntry {
                last_alert: now,
                last_level: level,
            },
        );
    }
}

/// Staff escalation message with a reproducible score breakdown.
///
/// A reviewer must be able to audit the decision without re-running the
/// engine, so every number feeding the final score is spelled out.
pub fn format_escalation(
    member: MemberId,
    level: RiskLevel,
    breakdown: &ScoreBreakdown,
    reasons: &[RiskReason],
) -> String {
    let reason_list = if reasons.is_empty() {
        "none".to_string()
    } else {
        reasons
            .iter()
            .map(|r| r.code())
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "⚠️ Admission Risk Escalation\n\n\
         Member: {}\n\
         Risk level: {}\n\n\
         Score breakdown:\n\
         • Base (heuristics): {}\n\
         • Trust adjustment: {:+.1} (trust score {})\n\
         • Threat penalty: +{}\n\
         • Final: {}\n\n\
         Signals: {}",
        member,
        level,
        breakdown.base_score,
        -breakdown.trust_adjustment,
        breakdown.trust_score,
        breakdown.threat_penalty,
        breakdown.final_score,
        reason_list
    )
}
