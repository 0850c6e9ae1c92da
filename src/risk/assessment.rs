//! Risk levels, reason codes, and the persisted assessment record.

use crate::member::{CommunityId, MemberId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Score at which an assessment is considered high risk.
pub const HIGH_THRESHOLD: u8 = 80;
/// Score at which an assessment is considered medium risk.
pub const MEDIUM_THRESHOLD: u8 = 60;
/// Score at which an assessment is considered elevated risk.
pub const ELEVATED_THRESHOLD: u8 = 40;

/// Ordinal risk classification derived from a 0-100 score.
///
/// Variant order is the ordinal order: `Low < Elevated < Medium < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Elevated,
    Medium,
    High,
}

impl RiskLevel {
    /// Derive the level from a clamped 0-100 score.
    pub fn from_score(score: u8) -> Self {
        match score {
            s if s >= HIGH_THRESHOLD => RiskLevel::High,
            s if s >= MEDIUM_THRESHOLD => RiskLevel::Medium,
            s if s >= ELEVATED_THRESHOLD => RiskLevel::Elevated,
            _ => RiskLevel::Low,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Elevated => "elevated",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "low" => Some(RiskLevel::Low),
            "elevated" => Some(RiskLevel::Elevated),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Known contributing signals, kept as a typed enum so escalation messages
/// and audit payloads stay inspectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskReason {
    VeryNewAccount,
    NewAccount,
    NoAvatar,
    NoMutuals,
    JoinVelocity,
    ElevatedJoinVelocity,
    LowTrustScore,
    /// Active external threat record; payload is the severity value (2-10).
    ThreatSeverity(u8),
}

impl RiskReason {
    /// Stable string code for audit payloads and staff messages.
    pub fn code(&self) -> String {
        match self {
            RiskReason::VeryNewAccount => "very_new_account".to_string(),
            RiskReason::NewAccount => "new_account".to_string(),
            RiskReason::NoAvatar => "no_avatar".to_string(),
            RiskReason::NoMutuals => "no_mutuals".to_string(),
            RiskReason::JoinVelocity => "join_velocity".to_string(),
            RiskReason::ElevatedJoinVelocity => "elevated_join_velocity".to_string(),
            RiskReason::LowTrustScore => "low_trust_score".to_string(),
            RiskReason::ThreatSeverity(value) => format!("threat_severity_{}", value),
        }
    }
}

/// Heuristic assessment of one member's join.
///
/// Persisted as the latest-known assessment per (community, member),
/// overwritten on recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub community: CommunityId,
    pub member: MemberId,
    /// Clamped 0-100 heuristic score.
    pub score: u8,
    pub level: RiskLevel,
    pub account_age_days: u32,
    pub has_avatar: bool,
    pub mutual_communities: u32,
    /// Joins observed in the community's sliding window, this join included.
    pub join_velocity: u32,
    pub reasons: Vec<RiskReason>,
    /// When this assessment was computed (Unix seconds).
    pub assessed_at: u64,
}
