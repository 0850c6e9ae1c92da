//! Persisted record types shared by all `GateStore` implementations.

use crate::member::{CommunityId, MemberId, RoleId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trust score used when no record exists or the store is unreachable.
///
/// Unknown members are treated as mildly trusted rather than suspicious,
/// so legitimate new accounts are not penalized by missing history.
pub const NEUTRAL_TRUST_SCORE: u8 = 80;

/// Long-lived reputation record, maintained by external moderation actions.
/// Read-only to the admission core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRecord {
    /// 0-100; higher is more trusted.
    pub trust_score: u8,
    /// Set when staff explicitly marked the member safe or unsafe;
    /// suppresses heuristic staff escalations at high trust.
    pub manual_override: bool,
}

/// Severity tier of an external threat indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatSeverity {
    /// Numeric severity value fed into score fusion (multiplied by 10).
    pub fn value(&self) -> u8 {
        match self {
            ThreatSeverity::Low => 2,
            ThreatSeverity::Medium => 5,
            ThreatSeverity::High => 8,
            ThreatSeverity::Critical => 10,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ThreatSeverity::Low => "low",
            ThreatSeverity::Medium => "medium",
            ThreatSeverity::High => "high",
            ThreatSeverity::Critical => "critical",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "low" => Some(ThreatSeverity::Low),
            "medium" => Some(ThreatSeverity::Medium),
            "high" => Some(ThreatSeverity::High),
            "critical" => Some(ThreatSeverity::Critical),
            _ => None,
        }
    }
}

/// Externally sourced indicator of known-bad identity, keyed by member id
/// (not community-scoped: threat intel is global). Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatRecord {
    pub member: MemberId,
    pub severity: ThreatSeverity,
    /// Indicator type as reported by the feed (e.g. "token_farm", "raid_bot").
    pub kind: String,
    pub active: bool,
}

/// Append-only suspected-duplicate-account signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AltFlag {
    pub community: CommunityId,
    pub member: MemberId,
    /// Detection method that produced the flag.
    pub method: String,
    /// 0-1 confidence.
    pub confidence: f64,
    /// Free-form evidence, keyed by signal name.
    pub evidence: BTreeMap<String, String>,
    pub flagged_at: u64,
}

/// Subject of a whitelist entry: a specific member or any holder of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum WhitelistSubject {
    Member(MemberId),
    Role(RoleId),
}

/// Active allow-list entry; matching members bypass all scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub community: CommunityId,
    pub subject: WhitelistSubject,
    /// Unix seconds; `None` means the entry does not expire.
    pub expires_at: Option<u64>,
    pub added_by: Option<MemberId>,
    pub created_at: u64,
}

impl WhitelistEntry {
    /// Whether this entry covers the given member at `now`.
    pub fn covers(&self, member: MemberId, roles: &[RoleId], now: u64) -> bool {
        if self.expires_at.is_some_and(|t| now > t) {
            return false;
        }
        match self.subject {
            WhitelistSubject::Member(m) => m == member,
            WhitelistSubject::Role(r) => roles.contains(&r),
        }
    }
}

/// Append-only audit record mirroring an emitted gate event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub community: CommunityId,
    pub member: Option<MemberId>,
    /// Event kind, e.g. "challenge_issued".
    pub kind: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    pub timestamp: u64,
}

/// Query options for the audit log.
///
/// Results come back in reverse chronological order (most recent first).
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub kind: Option<String>,
    pub member: Option<MemberId>,
    /// Only entries strictly after this timestamp.
    pub after: Option<u64>,
    /// Maximum number of entries; `None` returns everything.
    pub limit: Option<usize>,
}
