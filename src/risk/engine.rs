//! Heuristic risk scoring for new members.
//!
//! The engine combines static account signals (age, avatar, mutual
//! communities) with a per-community sliding window of recent join times.
//! The window is in-memory only: velocity is approximate across process
//! restarts, a cheap heuristic rather than a security boundary.

use crate::clock::Clock;
use crate::member::{CommunityId, Member};
use crate::risk::assessment::{RiskAssessment, RiskLevel, RiskReason};
use crate::store::types::AltFlag;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, RwLock};

/// Neutral starting score before penalties.
pub const BASE_SCORE: u8 = 30;

/// Sliding join window length in seconds.
pub const DEFAULT_JOIN_WINDOW_SECS: u64 = 60;

/// Lazy-eviction threshold for the per-community window map.
const MAX_TRACKED_COMMUNITIES: usize = 1_000;

const PENALTY_VERY_NEW_ACCOUNT: u8 = 30;
const PENALTY_NEW_ACCOUNT: u8 = 15;
const PENALTY_NO_AVATAR: u8 = 10;
const PENALTY_NO_MUTUALS: u8 = 5;
const PENALTY_JOIN_VELOCITY: u8 = 20;
const PENALTY_ELEVATED_JOIN_VELOCITY: u8 = 10;

const JOIN_VELOCITY_THRESHOLD: u32 = 5;
const ELEVATED_JOIN_VELOCITY_THRESHOLD: u32 = 3;

/// Heuristic risk engine with a per-community join-velocity window.
pub struct RiskEngine {
    clock: Arc<dyn Clock>,
    window_secs: u64,
    /// Recent join times (Unix seconds) per community, pruned on every call.
    join_windows: RwLock<HashMap<CommunityId, VecDeque<u64>>>,
}

impl RiskEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_window(clock, DEFAULT_JOIN_WINDOW_SECS)
    }

    pub fn with_window(clock: Arc<dyn Clock>, window_secs: u64) -> Self {
        Self {
            clock,
            window_secs,
            join_windows: RwLock::new(HashMap::new()),
        }
    }

    /// Score a member's join.
    ///
    /// Records the join in the community's sliding window, prunes entries
    /// older than the window, and applies the additive penalties. The
    /// returned assessment carries the window size (this join included) as
    /// `join_velocity`.
    pub fn score(&self, member: &Member) -> RiskAssessment {
        let now = self.clock.now_unix();
        let join_velocity = self.record_join(member.community, now);

        let mut score = u32::from(BASE_SCORE);
        let mut reasons = Vec::new();

        let account_age_days = member.account_age_days(now);
        if account_age_days < 1 {
            score += u32::from(PENALTY_VERY_NEW_ACCOUNT);
            reasons.push(RiskReason::VeryNewAccount);
        } else if account_age_days < 7 {
            score += u32::from(PENALTY_NEW_ACCOUNT);
            reasons.push(RiskReason::NewAccount);
        }

        if !member.has_avatar {
            score += u32::from(PENALTY_NO_AVATAR);
            reasons.push(RiskReason::NoAvatar);
        }

        if member.mutual_communities == 0 {
            score += u32::from(PENALTY_NO_MUTUALS);
            reasons.push(RiskReason::NoMutuals);
        }

        if join_velocity >= JOIN_VELOCITY_THRESHOLD {
            score += u32::from(PENALTY_JOIN_VELOCITY);
            reasons.push(RiskReason::JoinVelocity);
        } else if join_velocity >= ELEVATED_JOIN_VELOCITY_THRESHOLD {
            score += u32::from(PENALTY_ELEVATED_JOIN_VELOCITY);
            reasons.push(RiskReason::ElevatedJoinVelocity);
        }

        let score = score.min(100) as u8;

        RiskAssessment {
            community: member.community,
            member: member.member,
            score,
            level: RiskLevel::from_score(score),
            account_age_days,
            has_avatar: member.has_avatar,
            mutual_communities: member.mutual_communities,
            join_velocity,
            reasons,
            assessed_at: now,
        }
    }

    /// Append a join to the community window and return the window size.
    fn record_join(&self, community: CommunityId, now: u64) -> u32 {
        let mut windows = self.join_windows.write().unwrap();

        if windows.len() > MAX_TRACKED_COMMUNITIES {
            let cutoff = now.saturating_sub(self.window_secs);
            windows.retain(|_, joins| joins.back().is_some_and(|t| *t >= cutoff));
        }

        let joins = windows.entry(community).or_default();
        let cutoff = now.saturating_sub(self.window_secs);
        while joins.front().is_some_and(|t| *t < cutoff) {
            joins.pop_front();
        }
        joins.push_back(now);
        joins.len() as u32
    }

    /// Suspected-duplicate-account signal for a high-risk, very-new join.
    ///
    /// Append-only: callers persist the flag but never mutate prior ones.
    pub fn alt_flag_for(&self, assessment: &RiskAssessment) -> Option<AltFlag> {
        if assessment.level != RiskLevel::High
            || !assessment.reasons.contains(&RiskReason::VeryNewAccount)
        {
            return None;
        }

        let mut evidence = BTreeMap::new();
        evidence.insert("score".to_string(), assessment.score.to_string());
        evidence.insert(
            "account_age_days".to_string(),
            assessment.account_age_days.to_string(),
        );
        evidence.insert(
            "join_velocity".to_string(),
            assessment.join_velocity.to_string(),
        );
        evidence.insert(
            "reasons".to_string(),
            assessment
                .reasons
                .iter()
                .map(|r| r.code())
                .collect::<Vec<_>>()
                .join(","),
        );

        Some(AltFlag {
            community: assessment.community,
            member: assessment.member,
            method: "join_heuristics".to_string(),
            confidence: f64::from(assessment.score) / 100.0,
            evidence,
            flagged_at: assessment.assessed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::member::{CommunityId, MemberId, RoleId};
    use crate::member::SECONDS_PER_DAY;
    use proptest::prelude::*;

    const NOW: u64 = 1_700_000_000;

    fn engine() -> (Arc<ManualClock>, RiskEngine) {
        let clock = Arc::new(ManualClock::new(NOW));
        let engine = RiskEngine::new(clock.clone());
        (clock, engine)
    }

    fn member(age_days: u64, has_avatar: bool, mutuals: u32) -> Member {
        Member {
            community: CommunityId(1),
            member: MemberId(100),
            account_created_at: NOW - age_days * SECONDS_PER_DAY,
            has_avatar,
            mutual_communities: mutuals,
            roles: vec![RoleId(5)],
        }
    }

    #[test]
    fn test_neutral_member_scores_base() {
        let (_, engine) = engine();
        // 30 days old, avatar, mutuals, first join in window.
        let assessment = engine.score(&member(30, true, 3));
        assert_eq!(assessment.score, BASE_SCORE);
        assert_eq!(assessment.level, RiskLevel::Low);
        assert!(assessment.reasons.is_empty());
        assert_eq!(assessment.join_velocity, 1);
    }

    #[test]
    fn test_very_new_account_penalties_sum() {
        let (_, engine) = engine();
        // 12h old, no avatar, no mutuals: 30 + 30 + 10 + 5 = 75.
        let assessment = engine.score(&member(0, false, 0));
        assert_eq!(assessment.score, 75);
        assert_eq!(assessment.level, RiskLevel::Medium);
        assert_eq!(
            assessment.reasons,
            vec![
                RiskReason::VeryNewAccount,
                RiskReason::NoAvatar,
                RiskReason::NoMutuals,
            ]
        );
    }

    #[test]
    fn test_new_account_branch_is_exclusive() {
        let (_, engine) = engine();
        // 3 days old: +15, not +30.
        let assessment = engine.score(&member(3, true, 2));
        assert_eq!(assessment.score, 45);
        assert_eq!(assessment.reasons, vec![RiskReason::NewAccount]);
    }

    #[test]
    fn test_join_velocity_thresholds() {
        let (_, engine) = engine();
        let m = member(30, true, 3);

        for _ in 0..2 {
            engine.score(&m);
        }
        // Third join in the window: elevated velocity.
        let third = engine.score(&m);
        assert_eq!(third.join_velocity, 3);
        assert!(third.reasons.contains(&RiskReason::ElevatedJoinVelocity));

        engine.score(&m);
        // Fifth join: full velocity penalty.
        let fifth = engine.score(&m);
        assert_eq!(fifth.join_velocity, 5);
        assert!(fifth.reasons.contains(&RiskReason::JoinVelocity));
        assert!(!fifth.reasons.contains(&RiskReason::ElevatedJoinVelocity));
    }

    #[test]
    fn test_window_prunes_old_joins() {
        let (clock, engine) = engine();
        let m = member(30, true, 3);

        for _ in 0..4 {
            engine.score(&m);
        }
        clock.advance(DEFAULT_JOIN_WINDOW_SECS + 1);

        let assessment = engine.score(&m);
        assert_eq!(assessment.join_velocity, 1);
    }

    #[test]
    fn test_windows_are_per_community() {
        let (_, engine) = engine();
        let mut a = member(30, true, 3);
        let mut b = member(30, true, 3);
        a.community = CommunityId(1);
        b.community = CommunityId(2);

        engine.score(&a);
        engine.score(&a);
        let in_b = engine.score(&b);
        assert_eq!(in_b.join_velocity, 1);
    }

    #[test]
    fn test_score_clamped_to_100() {
        let (_, engine) = engine();
        let m = member(0, false, 0);
        // Drive the window to the velocity penalty: 75 + 20 = 95, still < 100,
        // so verify the clamp arithmetic directly at the boundary.
        for _ in 0..5 {
            engine.score(&m);
        }
        let assessment = engine.score(&m);
        assert!(assessment.score <= 100);
        assert_eq!(assessment.score, 95);
        assert_eq!(assessment.level, RiskLevel::High);
    }

    #[test]
    fn test_alt_flag_only_for_high_and_very_new() {
        let (_, engine) = engine();

        // Medium-risk very-new member: no flag.
        let medium = engine.score(&member(0, false, 0));
        assert_eq!(medium.level, RiskLevel::Medium);
        assert!(engine.alt_flag_for(&medium).is_none());

        // Push into high via velocity.
        let m = member(0, false, 0);
        for _ in 0..4 {
            engine.score(&m);
        }
        let high = engine.score(&m);
        assert_eq!(high.level, RiskLevel::High);

        let flag = engine.alt_flag_for(&high).unwrap();
        assert_eq!(flag.method, "join_heuristics");
        assert!(flag.confidence > 0.9);
        assert_eq!(flag.evidence.get("score").unwrap(), "95");
    }

    proptest! {
        #[test]
        fn prop_score_always_in_bounds(
            age_days in 0u64..400,
            has_avatar: bool,
            mutuals in 0u32..10,
        ) {
            let (_, engine) = engine();
            let assessment = engine.score(&member(age_days, has_avatar, mutuals));
            prop_assert!(assessment.score >= BASE_SCORE);
            prop_assert!(assessment.score <= 100);
            prop_assert_eq!(assessment.level, RiskLevel::from_score(assessment.score));
        }

        #[test]
        fn prop_velocity_counts_joins_in_window(joins in 1usize..20) {
            let (_, engine) = engine();
            let m = member(30, true, 3);
            let mut last = 0;
            for _ in 0..joins {
                last = engine.score(&m).join_velocity;
            }
            prop_assert_eq!(last, joins as u32);
        }
    }
}
