//! Gate lifecycle events.
//!
//! Events are emitted fire-and-forget to an `EventSink` (dashboard/audit
//! collaborators) and mirrored into the store-backed audit log. Failures in
//! either path are logged and never propagated into the admission flow.

use crate::admission::challenge::ChallengeMode;
use crate::admission::fusion::ScoreBreakdown;
use crate::member::{CommunityId, MemberId};
use crate::risk::RiskLevel;
use crate::store::types::AuditRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Admission lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GateEvent {
    AssessmentRecorded {
        community: CommunityId,
        member: MemberId,
        score: u8,
        level: RiskLevel,
        reasons: Vec<String>,
    },
    AgeRejected {
        community: CommunityId,
        member: MemberId,
        account_age_days: u32,
        min_account_age_days: u32,
        kicked: bool,
    },
    AutoVerified {
        community: CommunityId,
        member: MemberId,
        /// "whitelist" or "low_risk".
        reason: String,
    },
    ChallengeIssued {
        community: CommunityId,
        member: MemberId,
        mode: ChallengeMode,
        level: RiskLevel,
        expires_at: u64,
    },
    ChallengeCompleted {
        community: CommunityId,
        member: MemberId,
        mode: ChallengeMode,
    },
    ChallengeFailed {
        community: CommunityId,
        member: MemberId,
        attempts: u32,
    },
    ChallengeExpired {
        community: CommunityId,
        member: MemberId,
    },
    EscalationRaised {
        community: CommunityId,
        member: MemberId,
        level: RiskLevel,
        breakdown: ScoreBreakdown,
        reasons: Vec<String>,
    },
}

impl GateEvent {
    /// Stable kind string for audit filtering.
    pub fn kind(&self) -> &'static str {
        match self {
            GateEvent::AssessmentRecorded { .. } => "assessment_recorded",
            GateEvent::AgeRejected { .. } => "age_rejected",
            GateEvent::AutoVerified { .. } => "auto_verified",
            GateEvent::ChallengeIssued { .. } => "challenge_issued",
            GateEvent::ChallengeCompleted { .. } => "challenge_completed",
            GateEvent::ChallengeFailed { .. } => "challenge_failed",
            GateEvent::ChallengeExpired { .. } => "challenge_expired",
            GateEvent::EscalationRaised { .. } => "escalation_raised",
        }
    }

    pub fn community(&self) -> CommunityId {
        match self {
            GateEvent::AssessmentRecorded { community, .. }
            | GateEvent::AgeRejected { community, .. }
            | GateEvent::AutoVerified { community, .. }
            | GateEvent::ChallengeIssued { community, .. }
            | GateEvent::ChallengeCompleted { community, .. }
            | GateEvent::ChallengeFailed { community, .. }
            | GateEvent::ChallengeExpired { community, .. }
            | GateEvent::EscalationRaised { community, .. } => *community,
        }
    }

    pub fn member(&self) -> MemberId {
        match self {
            GateEvent::AssessmentRecorded { member, .. }
            | GateEvent::AgeRejected { member, .. }
            | GateEvent::AutoVerified { member, .. }
            | GateEvent::ChallengeIssued { member, .. }
            | GateEvent::ChallengeCompleted { member, .. }
            | GateEvent::ChallengeFailed { member, .. }
            | GateEvent::ChallengeExpired { member, .. }
            | GateEvent::EscalationRaised { member, .. } => *member,
        }
    }

    /// Audit record mirroring this event.
    pub fn to_audit_record(&self, now: u64) -> AuditRecord {
        AuditRecord {
            community: self.community(),
            member: Some(self.member()),
            kind: self.kind().to_string(),
            payload: serde_json::to_value(self).unwrap_or(serde_json::Value::Null),
            timestamp: now,
        }
    }
}

/// Fire-and-forget event consumer.
///
/// Implementations must swallow their own failures (logging them); the
/// admission flow never blocks on event delivery.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &GateEvent);
}

/// Default sink: structured log line per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: &GateEvent) {
        tracing::info!(
            kind = event.kind(),
            community = %event.community(),
            member = %event.member(),
            "gate event"
        );
    }
}

/// Recording sink for tests.
#[derive(Clone, Default)]
pub struct MemoryEventSink {
    events: std::sync::Arc<std::sync::Mutex<Vec<GateEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GateEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn emit(&self, event: &GateEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_and_scope() {
        let event = GateEvent::ChallengeIssued {
            community: CommunityId(1),
            member: MemberId(2),
            mode: ChallengeMode::Button,
            level: RiskLevel::Medium,
            expires_at: 600,
        };
        assert_eq!(event.kind(), "challenge_issued");
        assert_eq!(event.community(), CommunityId(1));
        assert_eq!(event.member(), MemberId(2));
    }

    #[test]
    fn test_audit_record_payload_is_tagged() {
        let event = GateEvent::AutoVerified {
            community: CommunityId(1),
            member: MemberId(2),
            reason: "whitelist".to_string(),
        };
        let record = event.to_audit_record(99);
        assert_eq!(record.kind, "auto_verified");
        assert_eq!(record.timestamp, 99);
        assert_eq!(record.payload["type"], "auto_verified");
        assert_eq!(record.payload["reason"], "whitelist");
    }

    #[tokio::test]
    async fn test_memory_sink_records() {
        let sink = MemoryEventSink::new();
        sink.emit(&GateEvent::ChallengeExpired {
            community: CommunityId(1),
            member: MemberId(2),
        })
        .await;
        assert_eq!(sink.kinds(), vec!["challenge_expired"]);
    }
}
