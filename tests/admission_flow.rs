//! End-to-end admission flows against the in-memory store and mock chat
//! clients: join scoring, mode selection, challenge verification across
//! surfaces, lockout, expiry, and escalation throttling.

use narthex::admission::{
    AdmissionOrchestrator, ChallengeMode, ChallengeStatus, JoinOutcome, ResponseOutcome,
    ResponseSurface,
};
use narthex::clock::ManualClock;
use narthex::config::{CommunityConfig, VerificationMethod, VerificationProfile};
use narthex::events::MemoryEventSink;
use narthex::member::{CommunityId, Member, MemberId, RoleId, SECONDS_PER_DAY};
use narthex::notify::mock::{MockNotifier, MockRoleManager};
use narthex::risk::RiskLevel;
use narthex::store::{
    GateStore, MemoryStore, ThreatRecord, ThreatSeverity, TrustRecord, WhitelistEntry,
    WhitelistSubject,
};
use std::sync::Arc;

const NOW: u64 = 1_700_000_000;
const COMMUNITY: CommunityId = CommunityId(10);
const RESTRICTED: RoleId = RoleId(100);
const VERIFIED: RoleId = RoleId(200);

struct Harness {
    clock: Arc<ManualClock>,
    store: MemoryStore,
    notifier: MockNotifier,
    roles: MockRoleManager,
    events: MemoryEventSink,
    gate: AdmissionOrchestrator<MemoryStore, MockNotifier, MockRoleManager, MemoryEventSink>,
}

async fn harness(config: CommunityConfig) -> Harness {
    let clock = Arc::new(ManualClock::new(NOW));
    let store = MemoryStore::new();
    let notifier = MockNotifier::new();
    let roles = MockRoleManager::new();
    let events = MemoryEventSink::new();

    store
        .put_community_config(COMMUNITY, &config)
        .await
        .unwrap();

    let gate = AdmissionOrchestrator::new(
        Arc::new(store.clone()),
        notifier.clone(),
        roles.clone(),
        events.clone(),
        clock.clone(),
    );

    Harness {
        clock,
        store,
        notifier,
        roles,
        events,
        gate,
    }
}

/// Standard-profile config with advanced scan opted in and both gate roles
/// configured.
fn scanning_config() -> CommunityConfig {
    CommunityConfig {
        enable_advanced_scan: true,
        restricted_role_id: Some(RESTRICTED),
        verified_role_id: Some(VERIFIED),
        ..Default::default()
    }
}

/// A 12-hour-old account with no avatar and no mutuals.
fn fresh_member(id: u64) -> Member {
    Member {
        community: COMMUNITY,
        member: MemberId(id),
        account_created_at: NOW - 12 * 3_600,
        has_avatar: false,
        mutual_communities: 0,
        roles: vec![],
    }
}

/// A month-old account with avatar and mutuals.
fn established_member(id: u64) -> Member {
    Member {
        community: COMMUNITY,
        member: MemberId(id),
        account_created_at: NOW - 30 * SECONDS_PER_DAY,
        has_avatar: true,
        mutual_communities: 4,
        roles: vec![],
    }
}

/// Pull the verification code out of the recorded private challenge message.
fn extract_code(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && line.chars().all(|c| c.is_ascii_digit()))
        .expect("challenge message should embed a numeric code")
        .to_string()
}

/// Pull the review token out of the web challenge link.
fn extract_review_token(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("http"))
        .and_then(|url| url.rsplit('/').next())
        .expect("challenge message should embed a review link")
        .to_string()
}

#[tokio::test]
async fn test_medium_risk_join_gets_button_challenge_and_restricted_role() {
    let h = harness(scanning_config()).await;

    // base 30+30+10+5 = 75, trust unknown (80) -> 63 -> medium -> button.
    let outcome = h.gate.handle_join(&fresh_member(1)).await.unwrap();
    assert_eq!(
        outcome,
        JoinOutcome::ChallengeIssued {
            mode: ChallengeMode::Button,
            level: RiskLevel::Medium,
        }
    );

    // Restricted role applied while pending, no verified role yet.
    assert_eq!(
        h.roles.assigned_roles(),
        vec![(COMMUNITY, MemberId(1), RESTRICTED)]
    );

    // Challenge persisted as pending.
    let challenge = h.store.challenge(COMMUNITY, MemberId(1)).await.unwrap().unwrap();
    assert_eq!(challenge.status, ChallengeStatus::Pending);
    assert_eq!(challenge.mode, ChallengeMode::Button);

    // Assessment persisted with the heuristic base.
    let assessment = h.store.assessment(COMMUNITY, MemberId(1)).await.unwrap().unwrap();
    assert_eq!(assessment.score, 75);

    // Member received the challenge privately.
    let private = h.notifier.private_messages();
    assert_eq!(private.len(), 1);
    assert!(private[0].1.contains("Verify"));

    // Medium risk escalates to staff with a reproducible breakdown.
    let staff = h.notifier.staff_messages();
    assert_eq!(staff.len(), 1);
    assert!(staff[0].1.contains("Base (heuristics): 75"));
    assert!(staff[0].1.contains("Final: 63"));
    assert!(staff[0].1.contains("very_new_account"));
}

#[tokio::test]
async fn test_low_risk_join_auto_verifies() {
    let h = harness(scanning_config()).await;

    let outcome = h.gate.handle_join(&established_member(2)).await.unwrap();
    assert_eq!(outcome, JoinOutcome::AutoVerified { reason: "low_risk" });

    // Verified role granted straight away; no challenge row.
    assert_eq!(
        h.roles.assigned_roles(),
        vec![(COMMUNITY, MemberId(2), VERIFIED)]
    );
    assert!(h.store.challenge(COMMUNITY, MemberId(2)).await.unwrap().is_none());
    assert!(h.events.kinds().contains(&"auto_verified"));
    assert!(h.notifier.staff_messages().is_empty());
}

#[tokio::test]
async fn test_whitelist_bypasses_scoring() {
    let h = harness(scanning_config()).await;
    h.store
        .add_whitelist_entry(&WhitelistEntry {
            community: COMMUNITY,
            subject: WhitelistSubject::Member(MemberId(3)),
            expires_at: None,
            added_by: None,
            created_at: NOW,
        })
        .await
        .unwrap();

    let outcome = h.gate.handle_join(&fresh_member(3)).await.unwrap();
    assert_eq!(outcome, JoinOutcome::AutoVerified { reason: "whitelist" });

    // Scoring never ran: no assessment persisted.
    assert!(h.store.assessment(COMMUNITY, MemberId(3)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_expired_whitelist_entry_does_not_bypass() {
    let h = harness(scanning_config()).await;
    h.store
        .add_whitelist_entry(&WhitelistEntry {
            community: COMMUNITY,
            subject: WhitelistSubject::Member(MemberId(4)),
            expires_at: Some(NOW - 1),
            added_by: None,
            created_at: NOW - 1_000,
        })
        .await
        .unwrap();

    let outcome = h.gate.handle_join(&fresh_member(4)).await.unwrap();
    assert!(matches!(outcome, JoinOutcome::ChallengeIssued { .. }));
}

#[tokio::test]
async fn test_age_floor_rejects_before_scoring() {
    let config = CommunityConfig {
        min_account_age_days: 7,
        auto_kick_on_age_fail: true,
        ..scanning_config()
    };
    let h = harness(config).await;

    let outcome = h.gate.handle_join(&fresh_member(5)).await.unwrap();
    assert_eq!(outcome, JoinOutcome::Rejected { kicked: true });

    assert_eq!(h.roles.kicked_members().len(), 1);
    assert!(h.store.assessment(COMMUNITY, MemberId(5)).await.unwrap().is_none());
    assert!(h.events.kinds().contains(&"age_rejected"));
}

#[tokio::test]
async fn test_fail_open_on_trust_and_threat_outage() {
    let h = harness(scanning_config()).await;
    h.store.set_fail_trust(true);
    h.store.set_fail_threats(true);

    // Neutral defaults substitute: 75 - 12 = 63, medium, button.
    let outcome = h.gate.handle_join(&fresh_member(6)).await.unwrap();
    assert_eq!(
        outcome,
        JoinOutcome::ChallengeIssued {
            mode: ChallengeMode::Button,
            level: RiskLevel::Medium,
        }
    );
}

#[tokio::test]
async fn test_threat_record_amplifies_to_web_challenge() {
    let h = harness(scanning_config()).await;
    h.store.put_threat(ThreatRecord {
        member: MemberId(7),
        severity: ThreatSeverity::Critical,
        kind: "raid_bot".to_string(),
        active: true,
    });

    // 75 - 12 + 100 clamps to 100 -> high -> web (standard/auto).
    let outcome = h.gate.handle_join(&fresh_member(7)).await.unwrap();
    assert_eq!(
        outcome,
        JoinOutcome::ChallengeIssued {
            mode: ChallengeMode::Web,
            level: RiskLevel::High,
        }
    );
}

#[tokio::test]
async fn test_single_active_challenge_per_pair() {
    let h = harness(scanning_config()).await;

    h.gate.handle_join(&fresh_member(8)).await.unwrap();
    let first = h.store.challenge(COMMUNITY, MemberId(8)).await.unwrap().unwrap();

    h.clock.advance(120);
    h.gate.handle_join(&fresh_member(8)).await.unwrap();

    assert_eq!(h.store.challenge_rows(COMMUNITY, MemberId(8)), 1);
    let second = h.store.challenge(COMMUNITY, MemberId(8)).await.unwrap().unwrap();
    assert!(second.issued_at > first.issued_at);
    assert_eq!(second.status, ChallengeStatus::Pending);
}

#[tokio::test]
async fn test_code_challenge_correct_response_verifies() {
    let config = CommunityConfig {
        verification_method: VerificationMethod::Code,
        ..scanning_config()
    };
    let h = harness(config).await;

    h.gate.handle_join(&fresh_member(9)).await.unwrap();
    let code = extract_code(&h.notifier.private_messages()[0].1);

    let outcome = h
        .gate
        .handle_response(COMMUNITY, MemberId(9), ResponseSurface::Private, &code)
        .await
        .unwrap();
    assert_eq!(outcome, ResponseOutcome::Verified);

    // Restricted role removed, verified granted.
    assert_eq!(
        h.roles.removed_roles(),
        vec![(COMMUNITY, MemberId(9), RESTRICTED)]
    );
    assert!(h
        .roles
        .assigned_roles()
        .contains(&(COMMUNITY, MemberId(9), VERIFIED)));

    let challenge = h.store.challenge(COMMUNITY, MemberId(9)).await.unwrap().unwrap();
    assert_eq!(challenge.status, ChallengeStatus::Completed);
    assert!(h.events.kinds().contains(&"challenge_completed"));

    // Success message delivered.
    let private = h.notifier.private_messages();
    assert!(private.last().unwrap().1.contains("Verification complete"));
}

#[tokio::test]
async fn test_code_challenge_is_case_insensitive_on_input() {
    let config = CommunityConfig {
        verification_method: VerificationMethod::Code,
        ..scanning_config()
    };
    let h = harness(config).await;

    h.gate.handle_join(&fresh_member(10)).await.unwrap();
    let code = extract_code(&h.notifier.private_messages()[0].1);

    // Whitespace is trimmed; digits have no case but exercise the path.
    let outcome = h
        .gate
        .handle_response(
            COMMUNITY,
            MemberId(10),
            ResponseSurface::Command,
            &format!("  {}  ", code),
        )
        .await
        .unwrap();
    assert_eq!(outcome, ResponseOutcome::Verified);
}

#[tokio::test]
async fn test_lockout_after_max_attempts_then_no_op() {
    let config = CommunityConfig {
        verification_method: VerificationMethod::Code,
        ..scanning_config()
    };
    let h = harness(config).await;

    h.gate.handle_join(&fresh_member(11)).await.unwrap();

    for attempt in 1..=4u32 {
        let outcome = h
            .gate
            .handle_response(COMMUNITY, MemberId(11), ResponseSurface::Private, "wrong")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ResponseOutcome::Incorrect {
                remaining: 5 - attempt
            }
        );
    }

    // Fifth wrong answer locks.
    let outcome = h
        .gate
        .handle_response(COMMUNITY, MemberId(11), ResponseSurface::Private, "wrong")
        .await
        .unwrap();
    assert_eq!(outcome, ResponseOutcome::LockedOut);

    let challenge = h.store.challenge(COMMUNITY, MemberId(11)).await.unwrap().unwrap();
    assert_eq!(challenge.status, ChallengeStatus::Failed);
    assert_eq!(challenge.attempts, 5);

    // Sixth attempt is a no-op, not a sixth increment.
    let outcome = h
        .gate
        .handle_response(COMMUNITY, MemberId(11), ResponseSurface::Private, "wrong")
        .await
        .unwrap();
    assert_eq!(outcome, ResponseOutcome::NoChallenge);
    let challenge = h.store.challenge(COMMUNITY, MemberId(11)).await.unwrap().unwrap();
    assert_eq!(challenge.attempts, 5);

    assert!(h.events.kinds().contains(&"challenge_failed"));
    let lockout = h.notifier.private_messages();
    assert!(lockout.iter().any(|(_, m)| m.contains("locked")));
}

#[tokio::test]
async fn test_expiry_wins_over_correct_secret() {
    let config = CommunityConfig {
        verification_method: VerificationMethod::Code,
        ..scanning_config()
    };
    let h = harness(config).await;

    h.gate.handle_join(&fresh_member(12)).await.unwrap();
    let code = extract_code(&h.notifier.private_messages()[0].1);

    // Past the 10 minute TTL.
    h.clock.advance(601);

    let outcome = h
        .gate
        .handle_response(COMMUNITY, MemberId(12), ResponseSurface::Private, &code)
        .await
        .unwrap();
    assert_eq!(outcome, ResponseOutcome::Expired);

    let challenge = h.store.challenge(COMMUNITY, MemberId(12)).await.unwrap().unwrap();
    assert_eq!(challenge.status, ChallengeStatus::Expired);
    assert!(h.events.kinds().contains(&"challenge_expired"));
}

#[tokio::test]
async fn test_button_click_verifies_and_duplicates_are_throttled() {
    let h = harness(scanning_config()).await;

    h.gate.handle_join(&fresh_member(13)).await.unwrap();

    let outcome = h
        .gate
        .handle_response(COMMUNITY, MemberId(13), ResponseSurface::Interactive, "")
        .await
        .unwrap();
    assert_eq!(outcome, ResponseOutcome::Verified);

    // Double-click within the cooldown is swallowed before any state touch.
    let outcome = h
        .gate
        .handle_response(COMMUNITY, MemberId(13), ResponseSurface::Interactive, "")
        .await
        .unwrap();
    assert_eq!(outcome, ResponseOutcome::Throttled);

    // After the cooldown the challenge is terminal, so a late click no-ops.
    h.clock.advance(11);
    let outcome = h
        .gate
        .handle_response(COMMUNITY, MemberId(13), ResponseSurface::Interactive, "")
        .await
        .unwrap();
    assert_eq!(outcome, ResponseOutcome::NoChallenge);
}

#[tokio::test]
async fn test_button_challenge_ignores_text_replies() {
    let h = harness(scanning_config()).await;

    h.gate.handle_join(&fresh_member(14)).await.unwrap();
    let outcome = h
        .gate
        .handle_response(COMMUNITY, MemberId(14), ResponseSurface::Private, "hello?")
        .await
        .unwrap();
    assert_eq!(outcome, ResponseOutcome::Ignored);

    let challenge = h.store.challenge(COMMUNITY, MemberId(14)).await.unwrap().unwrap();
    assert_eq!(challenge.attempts, 0);
}

#[tokio::test]
async fn test_private_delivery_failure_falls_back_to_community_surface() {
    let h = harness(scanning_config()).await;
    h.notifier.set_fail_private(true);

    h.gate.handle_join(&fresh_member(15)).await.unwrap();

    assert!(h.notifier.private_messages().is_empty());
    let fallback = h.notifier.fallback_messages();
    assert_eq!(fallback.len(), 1);
    assert_eq!(fallback[0].1, MemberId(15));
    assert!(fallback[0].2.contains("couldn't reach you"));

    // Challenge still exists and is completable later.
    let challenge = h.store.challenge(COMMUNITY, MemberId(15)).await.unwrap().unwrap();
    assert_eq!(challenge.status, ChallengeStatus::Pending);
}

#[tokio::test]
async fn test_escalation_throttled_within_cooldown_but_worse_level_breaks_through() {
    let h = harness(scanning_config()).await;

    h.gate.handle_join(&fresh_member(16)).await.unwrap();
    assert_eq!(h.notifier.staff_messages().len(), 1);

    // Re-join at the same level inside the cooldown: suppressed.
    h.clock.advance(120);
    h.gate.handle_join(&fresh_member(16)).await.unwrap();
    assert_eq!(h.notifier.staff_messages().len(), 1);

    // A critical threat pushes the level to high: the cooldown yields.
    h.store.put_threat(ThreatRecord {
        member: MemberId(16),
        severity: ThreatSeverity::Critical,
        kind: "raid_bot".to_string(),
        active: true,
    });
    h.clock.advance(120);
    h.gate.handle_join(&fresh_member(16)).await.unwrap();
    assert_eq!(h.notifier.staff_messages().len(), 2);
}

#[tokio::test]
async fn test_manual_trust_override_suppresses_escalation() {
    let h = harness(scanning_config()).await;
    h.store.put_trust(
        COMMUNITY,
        MemberId(17),
        TrustRecord {
            trust_score: 85,
            manual_override: true,
        },
    );

    // Trust 85 dampens 75 to 61: still medium, but marked safe.
    let outcome = h.gate.handle_join(&fresh_member(17)).await.unwrap();
    assert!(matches!(outcome, JoinOutcome::ChallengeIssued { .. }));
    assert!(h.notifier.staff_messages().is_empty());
}

#[tokio::test]
async fn test_sweep_terminalizes_abandoned_challenges() {
    let h = harness(scanning_config()).await;

    h.gate.handle_join(&fresh_member(18)).await.unwrap();
    h.gate.handle_join(&fresh_member(19)).await.unwrap();

    h.clock.advance(601);
    let count = h.gate.sweep_expired().await.unwrap();
    assert_eq!(count, 2);

    for id in [18, 19] {
        let challenge = h
            .store
            .challenge(COMMUNITY, MemberId(id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(challenge.status, ChallengeStatus::Expired);
    }

    // Members are told about the expiry.
    let expiry_notices = h
        .notifier
        .private_messages()
        .iter()
        .filter(|(_, m)| m.contains("expired"))
        .count();
    assert_eq!(expiry_notices, 2);

    // Nothing left for a second pass.
    assert_eq!(h.gate.sweep_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn test_ultra_profile_web_review_approval_flow() {
    let config = CommunityConfig {
        profile: VerificationProfile::Ultra,
        ..scanning_config()
    };
    let h = harness(config).await;

    // Even an established member gets a web challenge on ultra.
    let outcome = h.gate.handle_join(&established_member(20)).await.unwrap();
    assert!(matches!(
        outcome,
        JoinOutcome::ChallengeIssued {
            mode: ChallengeMode::Web,
            ..
        }
    ));

    let token = extract_review_token(&h.notifier.private_messages()[0].1);

    let outcome = h
        .gate
        .handle_review_decision(COMMUNITY, MemberId(20), &token, true)
        .await
        .unwrap();
    assert_eq!(outcome, ResponseOutcome::Verified);

    let challenge = h.store.challenge(COMMUNITY, MemberId(20)).await.unwrap().unwrap();
    assert_eq!(challenge.status, ChallengeStatus::Completed);
}

#[tokio::test]
async fn test_web_review_denial_and_bad_token() {
    let config = CommunityConfig {
        profile: VerificationProfile::Ultra,
        ..scanning_config()
    };
    let h = harness(config).await;

    h.gate.handle_join(&established_member(21)).await.unwrap();
    let token = extract_review_token(&h.notifier.private_messages()[0].1);

    // Wrong token is ignored without consuming anything.
    let outcome = h
        .gate
        .handle_review_decision(COMMUNITY, MemberId(21), "bogus", true)
        .await
        .unwrap();
    assert_eq!(outcome, ResponseOutcome::Ignored);

    // Denial terminalizes as failed. The decision cooldown applies per
    // (pair, action), so advance past it first.
    h.clock.advance(11);
    let outcome = h
        .gate
        .handle_review_decision(COMMUNITY, MemberId(21), &token, false)
        .await
        .unwrap();
    assert_eq!(outcome, ResponseOutcome::Denied);

    let challenge = h.store.challenge(COMMUNITY, MemberId(21)).await.unwrap().unwrap();
    assert_eq!(challenge.status, ChallengeStatus::Failed);

    // Duplicate decision click inside the cooldown is throttled.
    let outcome = h
        .gate
        .handle_review_decision(COMMUNITY, MemberId(21), &token, false)
        .await
        .unwrap();
    assert_eq!(outcome, ResponseOutcome::Throttled);
}

#[tokio::test]
async fn test_unexpected_store_error_is_acknowledged_to_responder() {
    let config = CommunityConfig {
        verification_method: VerificationMethod::Code,
        ..scanning_config()
    };
    let h = harness(config).await;

    h.gate.handle_join(&fresh_member(22)).await.unwrap();
    h.store.set_fail_challenges(true);

    let result = h
        .gate
        .handle_response(COMMUNITY, MemberId(22), ResponseSurface::Private, "1234")
        .await;
    assert!(result.is_err());

    // The responder still got an explicit (generic) outcome.
    let private = h.notifier.private_messages();
    assert!(private
        .last()
        .unwrap()
        .1
        .contains("Something went wrong"));
}

#[tokio::test]
async fn test_events_are_mirrored_into_audit_log() {
    let h = harness(scanning_config()).await;

    h.gate.handle_join(&fresh_member(23)).await.unwrap();
    h.gate
        .handle_response(COMMUNITY, MemberId(23), ResponseSurface::Interactive, "")
        .await
        .unwrap();

    let kinds: Vec<String> = h
        .store
        .audit_records()
        .iter()
        .map(|r| r.kind.clone())
        .collect();
    assert!(kinds.contains(&"assessment_recorded".to_string()));
    assert!(kinds.contains(&"challenge_issued".to_string()));
    assert!(kinds.contains(&"challenge_completed".to_string()));
}
