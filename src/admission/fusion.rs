//! Score fusion: blend heuristic risk with persisted trust and external
//! threat intelligence.
//!
//! Trust strictly dampens risk and confirmed threats strictly amplify it,
//! regardless of heuristic noise. Callers substitute neutral inputs when a
//! scoring store is unreachable (trust 80, no threats); fusion itself is
//! pure and infallible.

use crate::risk::assessment::{RiskAssessment, RiskLevel, RiskReason};
use crate::risk::engine::BASE_SCORE;
use crate::store::types::{ThreatRecord, TrustRecord, NEUTRAL_TRUST_SCORE};
use serde::{Deserialize, Serialize};

/// Trust below this adds the `low_trust_score` reason.
const LOW_TRUST_THRESHOLD: u8 = 30;

/// Reproducible decomposition of a fused score, included in staff
/// escalations so a reviewer can audit the decision without re-running
/// the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Heuristic base actually used (neutral 30 when advanced scan is off).
    pub base_score: u8,
    pub trust_score: u8,
    /// Subtracted from the base: `(trust - 50) * 0.4`.
    pub trust_adjustment: f64,
    /// Added to the base: `max(severity value) * 10`.
    pub threat_penalty: u8,
    pub final_score: u8,
}

/// Outcome of fusing one assessment with trust and threat inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedAssessment {
    pub score: u8,
    pub level: RiskLevel,
    pub reasons: Vec<RiskReason>,
    pub breakdown: ScoreBreakdown,
}

/// Fuse a base assessment with trust and threat records.
///
/// `advanced_scan` off replaces the heuristic base with the fixed neutral
/// placeholder (score 30, no reasons); trust and threat signals still apply.
/// `trust` of `None` means "unknown or unreadable" and defaults to the
/// neutral 80.
pub fn fuse(
    base: &RiskAssessment,
    advanced_scan: bool,
    trust: Option<&TrustRecord>,
    threats: &[ThreatRecord],
) -> FusedAssessment {
    let (base_score, mut reasons) = if advanced_scan {
        (base.score, base.reasons.clone())
    } else {
        (BASE_SCORE, Vec::new())
    };

    let trust_score = trust.map_or(NEUTRAL_TRUST_SCORE, |t| t.trust_score);
    let trust_adjustment = (f64::from(trust_score) - 50.0) * 0.4;

    let max_severity = threats
        .iter()
        .filter(|t| t.active)
        .map(|t| t.severity.value())
        .max()
        .unwrap_or(0);
    let threat_penalty = max_severity.saturating_mul(10);

    if trust_score < LOW_TRUST_THRESHOLD {
        reasons.push(RiskReason::LowTrustScore);
    }
    if max_severity > 0 {
        reasons.push(RiskReason::ThreatSeverity(max_severity));
    }

    let raw = f64::from(base_score) - trust_adjustment + f64::from(threat_penalty);
    let final_score = raw.round().clamp(0.0, 100.0) as u8;

    FusedAssessment {
        score: final_score,
        level: RiskLevel::from_score(final_score),
        reasons,
        breakdown: ScoreBreakdown {
            base_score,
            trust_score,
            trust_adjustment,
            threat_penalty,
            final_score,
        },
    }
}
