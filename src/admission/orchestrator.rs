//! Admission state machine.
//!
//! Drives a member from join to a terminal state:
//! `unassessed -> {auto-verified | pending(mode) -> {verified | failed | expired}}`.
//!
//! Every store read on the join path fails open (neutral defaults) and every
//! delivery failure falls back or degrades to a log line: a scoring-store
//! outage must never block a legitimate join.

use crate::admission::challenge::{Challenge, ChallengeMode, ChallengeStatus};
use crate::admission::fusion::{fuse, FusedAssessment};
use crate::admission::messages::*;
use crate::clock::Clock;
use crate::config::{CommunityConfig, VerificationMethod, VerificationProfile};
use crate::events::{EventSink, GateEvent};
use crate::gatekeeper::alert::{format_escalation, AlertThrottler};
use crate::gatekeeper::rate_limiter::{ActionRateLimiter, GateAction};
use crate::member::{CommunityId, Member, MemberId, RoleId};
use crate::notify::retry::retry_with_backoff;
use crate::notify::traits::{is_chat_error_retryable, ChatError, Notifier, RoleManager};
use crate::risk::{RiskEngine, RiskLevel};
use crate::store::traits::{GateStore, StoreError};
use crate::store::types::TrustRecord;
use std::sync::Arc;

/// Default base URL for the staff review surface (web mode links).
const DEFAULT_REVIEW_URL_BASE: &str = "https://verify.example.org/review";

/// Fused level at or above which staff are escalated.
const ESCALATION_LEVEL: RiskLevel = RiskLevel::Medium;

/// Errors that abort an admission operation.
///
/// Scoring-store and delivery failures never surface here; only failures
/// that leave the state machine unable to proceed (e.g. the challenge row
/// cannot be written) do.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),
}

/// Where a response event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSurface {
    /// Private reply to the bot.
    Private,
    /// Reply in a community channel.
    Community,
    /// Interactive-button callback.
    Interactive,
    /// Structured form submit.
    Form,
    /// Command-based entry (e.g. `/verify <code>`).
    Command,
}

/// Outcome of a join event.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    /// Below the configured account-age floor.
    Rejected { kicked: bool },
    AutoVerified { reason: &'static str },
    ChallengeIssued {
        mode: ChallengeMode,
        level: RiskLevel,
    },
}

/// Outcome of a response event.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// No pending challenge for the pair; responses are a no-op, not an error.
    NoChallenge,
    /// Response surface cannot complete this challenge mode.
    Ignored,
    /// Suppressed by the duplicate-action cooldown.
    Throttled,
    Expired,
    Incorrect { remaining: u32 },
    LockedOut,
    Denied,
    Verified,
}

/// The admission orchestrator.
pub struct AdmissionOrchestrator<S, N, R, E>
where
    S: GateStore,
    N: Notifier,
    R: RoleManager,
    E: EventSink,
{
    store: Arc<S>,
    notifier: N,
    roles: R,
    events: E,
    clock: Arc<dyn Clock>,
    risk: RiskEngine,
    alerts: AlertThrottler,
    actions: ActionRateLimiter,
    review_url_base: String,
}

impl<S, N, R, E> AdmissionOrchestrator<S, N, R, E>
where
    S: GateStore,
    N: Notifier,
    R: RoleManager,
    E: EventSink,
{
    pub fn new(store: Arc<S>, notifier: N, roles: R, events: E, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            roles,
            events,
            risk: RiskEngine::new(clock.clone()),
            alerts: AlertThrottler::new(clock.clone()),
            actions: ActionRateLimiter::new(clock.clone()),
            clock,
            review_url_base: DEFAULT_REVIEW_URL_BASE.to_string(),
        }
    }

    /// Override the staff review surface base URL (web mode links).
    pub fn with_review_url_base(mut self, base: impl Into<String>) -> Self {
        self.review_url_base = base.into();
        self
    }

    /// Handle a member-join event end to end.
    pub async fn handle_join(&self, member: &Member) -> Result<JoinOutcome, AdmissionError> {
        let community = member.community;
        let member_id = member.member;
        let config = self.load_config(community).await;
        let now = self.clock.now_unix();

        // 1. Hard account-age floor, before any scoring.
        if config.min_account_age_days > 0 {
            let age = member.account_age_days(now);
            if age < config.min_account_age_days {
                let kicked = if config.auto_kick_on_age_fail {
                    match self
                        .roles
                        .kick(community, member_id, "account below minimum age")
                        .await
                    {
                        Ok(()) => true,
                        Err(err) => {
                            tracing::warn!(%community, %member_id, %err, "age-floor kick failed");
                            false
                        }
                    }
                } else {
                    false
                };
                self.record_event(GateEvent::AgeRejected {
                    community,
                    member: member_id,
                    account_age_days: age,
                    min_account_age_days: config.min_account_age_days,
                    kicked,
                })
                .await;
                return Ok(JoinOutcome::Rejected { kicked });
            }
        }

        // 2. Whitelist bypass: member or any held role on an active entry.
        if self.is_whitelisted(member, now).await {
            self.finalize_auto(community, member_id, &config, "whitelist")
                .await;
            return Ok(JoinOutcome::AutoVerified {
                reason: "whitelist",
            });
        }

        // 3. Heuristic scoring. Persisting the assessment is best-effort.
        let assessment = self.risk.score(member);
        if let Err(err) = self.store.upsert_assessment(&assessment).await {
            tracing::warn!(%community, %member_id, %err, "assessment persist failed, continuing");
        }
        if let Some(flag) = self.risk.alt_flag_for(&assessment) {
            if let Err(err) = self.store.append_alt_flag(&flag).await {
                tracing::warn!(%community, %member_id, %err, "alt flag persist failed");
            }
        }
        self.record_event(GateEvent::AssessmentRecorded {
            community,
            member: member_id,
            score: assessment.score,
            level: assessment.level,
            reasons: assessment.reasons.iter().map(|r| r.code()).collect(),
        })
        .await;

        // 4. Fusion with trust and threat stores; both reads fail open.
        let trust = match self.store.trust_record(community, member_id).await {
            Ok(trust) => trust,
            Err(err) => {
                tracing::warn!(%community, %member_id, %err, "trust read failed, assuming neutral");
                None
            }
        };
        let threats = match self.store.active_threats(member_id).await {
            Ok(threats) => threats,
            Err(err) => {
                tracing::warn!(%community, %member_id, %err, "threat read failed, assuming none");
                Vec::new()
            }
        };
        let fused = fuse(
            &assessment,
            config.advanced_scan_enabled(),
            trust.as_ref(),
            &threats,
        );
        tracing::debug!(
            %community,
            %member_id,
            base = assessment.score,
            fused = fused.score,
            level = %fused.level,
            "risk fused"
        );

        // 5. Mode selection and issuance.
        let outcome = match select_mode(&config, fused.level) {
            None => {
                self.finalize_auto(community, member_id, &config, "low_risk")
                    .await;
                JoinOutcome::AutoVerified { reason: "low_risk" }
            }
            Some(mode) => {
                // No ambient access while pending.
                if let Some(role) = config.restricted_role_id {
                    self.assign_role_logged(community, member_id, role).await;
                }
                self.issue_challenge(member, mode, &config, &fused, now)
                    .await?;
                JoinOutcome::ChallengeIssued {
                    mode,
                    level: fused.level,
                }
            }
        };

        // 6. Staff escalation, throttled.
        if config.enable_staff_escalation && fused.level >= ESCALATION_LEVEL {
            self.escalate(community, member_id, &fused, trust.as_ref())
                .await;
        }

        Ok(outcome)
    }

    /// Handle a challenge response from any surface.
    ///
    /// Unexpected failures are acknowledged to the responder with a generic
    /// message before propagating.
    pub async fn handle_response(
        &self,
        community: CommunityId,
        member: MemberId,
        surface: ResponseSurface,
        input: &str,
    ) -> Result<ResponseOutcome, AdmissionError> {
        match self.verify_response(community, member, surface, input).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::error!(%community, %member, %err, "response handling failed");
                let _ = self.notifier.send_private(member, &msg_generic_failure()).await;
                Err(err)
            }
        }
    }

    /// Staff approval/denial arriving from the web review surface.
    pub async fn handle_review_decision(
        &self,
        community: CommunityId,
        member: MemberId,
        token: &str,
        approved: bool,
    ) -> Result<ResponseOutcome, AdmissionError> {
        if self
            .actions
            .is_rate_limited(community, member, GateAction::ReviewDecision)
        {
            return Ok(ResponseOutcome::Throttled);
        }

        let Some(mut challenge) = self.store.challenge(community, member).await? else {
            return Ok(ResponseOutcome::NoChallenge);
        };
        if challenge.status.is_terminal() {
            return Ok(ResponseOutcome::NoChallenge);
        }
        if challenge.mode != ChallengeMode::Web {
            return Ok(ResponseOutcome::Ignored);
        }

        // The review window has its own expiry, outliving the member-facing
        // TTL; a swept challenge is already terminal and handled above.
        let now = self.clock.now_unix();
        if !challenge.review_token_valid(token, now) {
            return Ok(ResponseOutcome::Ignored);
        }

        if approved {
            self.complete_challenge(&mut challenge).await?;
            Ok(ResponseOutcome::Verified)
        } else {
            challenge.status = ChallengeStatus::Failed;
            self.store.put_challenge(&challenge).await?;
            self.deliver(community, member, &msg_review_denied()).await;
            self.record_event(GateEvent::ChallengeFailed {
                community,
                member,
                attempts: challenge.attempts,
            })
            .await;
            Ok(ResponseOutcome::Denied)
        }
    }

    /// Terminalize pending challenges whose expiry has passed.
    ///
    /// Expiry is also checked lazily at response time; this sweep catches
    /// members who never respond. Returns the number of challenges expired.
    pub async fn sweep_expired(&self) -> Result<usize, AdmissionError> {
        let now = self.clock.now_unix();
        let expired = self.store.expired_pending_challenges(now).await?;
        let count = expired.len();

        for mut challenge in expired {
            challenge.status = ChallengeStatus::Expired;
            if let Err(err) = self.store.put_challenge(&challenge).await {
                tracing::warn!(
                    community = %challenge.community,
                    member = %challenge.member,
                    %err,
                    "failed to terminalize expired challenge"
                );
                continue;
            }
            self.deliver(challenge.community, challenge.member, &msg_expired())
                .await;
            self.record_event(GateEvent::ChallengeExpired {
                community: challenge.community,
                member: challenge.member,
            })
            .await;
        }

        Ok(count)
    }

    async fn verify_response(
        &self,
        community: CommunityId,
        member: MemberId,
        surface: ResponseSurface,
        input: &str,
    ) -> Result<ResponseOutcome, AdmissionError> {
        // Duplicate rapid clicks on the same affordance collapse into one.
        if surface == ResponseSurface::Interactive
            && self
                .actions
                .is_rate_limited(community, member, GateAction::ChallengeClick)
        {
            return Ok(ResponseOutcome::Throttled);
        }

        let Some(mut challenge) = self.store.challenge(community, member).await? else {
            return Ok(ResponseOutcome::NoChallenge);
        };
        // Terminal rows stay until the next join; a response against one is
        // a no-op, which is what makes lockout monotone.
        if challenge.status.is_terminal() {
            return Ok(ResponseOutcome::NoChallenge);
        }

        // Expiry wins even over a correct secret.
        let now = self.clock.now_unix();
        if challenge.is_expired(now) {
            challenge.status = ChallengeStatus::Expired;
            self.store.put_challenge(&challenge).await?;
            self.deliver(community, member, &msg_expired()).await;
            self.record_event(GateEvent::ChallengeExpired { community, member })
                .await;
            return Ok(ResponseOutcome::Expired);
        }

        let matched = match challenge.mode {
            // Clicking the affordance is the response; no secret involved.
            ChallengeMode::Button => {
                if surface != ResponseSurface::Interactive {
                    return Ok(ResponseOutcome::Ignored);
                }
                true
            }
            ChallengeMode::Code | ChallengeMode::Web => challenge.matches(input),
        };

        if matched {
            self.complete_challenge(&mut challenge).await?;
            return Ok(ResponseOutcome::Verified);
        }

        let locked = challenge.register_failure();
        self.store.put_challenge(&challenge).await?;
        if locked {
            self.deliver(community, member, &msg_lockout()).await;
            self.record_event(GateEvent::ChallengeFailed {
                community,
                member,
                attempts: challenge.attempts,
            })
            .await;
            Ok(ResponseOutcome::LockedOut)
        } else {
            let remaining = challenge.remaining_attempts();
            self.deliver(community, member, &msg_incorrect(remaining)).await;
            Ok(ResponseOutcome::Incorrect { remaining })
        }
    }

    /// Mark completed, swap roles, notify, and emit.
    async fn complete_challenge(&self, challenge: &mut Challenge) -> Result<(), AdmissionError> {
        let community = challenge.community;
        let member = challenge.member;

        challenge.status = ChallengeStatus::Completed;
        self.store.put_challenge(challenge).await?;

        let config = self.load_config(community).await;
        if let Some(role) = config.restricted_role_id {
            self.remove_role_logged(community, member, role).await;
        }
        if let Some(role) = config.verified_role_id {
            self.assign_role_logged(community, member, role).await;
        }

        self.deliver(community, member, &msg_success()).await;
        self.record_event(GateEvent::ChallengeCompleted {
            community,
            member,
            mode: challenge.mode,
        })
        .await;
        Ok(())
    }

    async fn issue_challenge(
        &self,
        member: &Member,
        mode: ChallengeMode,
        config: &CommunityConfig,
        fused: &FusedAssessment,
        now: u64,
    ) -> Result<(), AdmissionError> {
        let community = member.community;
        let member_id = member.member;

        // At most one active challenge per pair: delete-then-insert.
        self.store.delete_challenge(community, member_id).await?;
        let (challenge, secrets) = Challenge::issue(community, member_id, mode, config, now);
        self.store.put_challenge(&challenge).await?;

        let name = community_name(config, community);
        let content = match mode {
            ChallengeMode::Button => msg_challenge_button(&name),
            ChallengeMode::Code => msg_challenge_code(
                &name,
                secrets.secret.as_deref().unwrap_or_default(),
                u64::from(config.challenge_timeout_minutes),
            ),
            ChallengeMode::Web => {
                let token = secrets.review_token.as_deref().unwrap_or_default();
                msg_challenge_web(&name, &format!("{}/{}", self.review_url_base, token))
            }
        };
        self.deliver(community, member_id, &content).await;

        self.record_event(GateEvent::ChallengeIssued {
            community,
            member: member_id,
            mode,
            level: fused.level,
            expires_at: challenge.expires_at,
        })
        .await;
        Ok(())
    }

    /// Auto-verification path: whitelist bypass or low fused risk.
    async fn finalize_auto(
        &self,
        community: CommunityId,
        member: MemberId,
        config: &CommunityConfig,
        reason: &'static str,
    ) {
        if let Some(role) = config.verified_role_id {
            self.assign_role_logged(community, member, role).await;
        }
        self.record_event(GateEvent::AutoVerified {
            community,
            member,
            reason: reason.to_string(),
        })
        .await;
    }

    async fn escalate(
        &self,
        community: CommunityId,
        member: MemberId,
        fused: &FusedAssessment,
        trust: Option<&TrustRecord>,
    ) {
        if !self.alerts.should_alert(community, member, fused.level, trust) {
            tracing::debug!(%community, %member, "escalation suppressed by cooldown");
            return;
        }

        let message = format_escalation(member, fused.level, &fused.breakdown, &fused.reasons);
        match self.notifier.send_staff(community, &message).await {
            Ok(()) => self.alerts.record(community, member, fused.level),
            Err(err) => {
                tracing::warn!(%community, %member, %err, "staff escalation delivery failed");
            }
        }
        self.record_event(GateEvent::EscalationRaised {
            community,
            member,
            level: fused.level,
            breakdown: fused.breakdown.clone(),
            reasons: fused.reasons.iter().map(|r| r.code()).collect(),
        })
        .await;
    }

    /// Private delivery with visible fallback. Both failing leaves the
    /// challenge completable once the member becomes reachable.
    async fn deliver(&self, community: CommunityId, member: MemberId, content: &str) {
        if let Err(err) = self.notifier.send_private(member, content).await {
            tracing::warn!(%community, %member, %err, "private delivery failed, using fallback");
            let fallback = format!("{}\n\n{}", msg_fallback_mention(member), content);
            if let Err(err) = self
                .notifier
                .send_fallback(community, member, &fallback)
                .await
            {
                tracing::warn!(%community, %member, %err, "fallback delivery failed");
            }
        }
    }

    async fn assign_role_logged(&self, community: CommunityId, member: MemberId, role: RoleId) {
        let roles = self.roles.clone();
        let result = retry_with_backoff(
            || {
                let roles = roles.clone();
                async move { roles.assign_role(community, member, role).await }
            },
            is_chat_error_retryable,
        )
        .await;
        if let Err(err) = result {
            // Member may have left mid-flow; non-fatal.
            tracing::warn!(%community, %member, %role, %err, "role assignment failed");
        }
    }

    async fn remove_role_logged(&self, community: CommunityId, member: MemberId, role: RoleId) {
        let roles = self.roles.clone();
        let result = retry_with_backoff(
            || {
                let roles = roles.clone();
                async move { roles.remove_role(community, member, role).await }
            },
            is_chat_error_retryable,
        )
        .await;
        if let Err(err) = result {
            tracing::warn!(%community, %member, %role, %err, "role removal failed");
        }
    }

    async fn is_whitelisted(&self, member: &Member, now: u64) -> bool {
        match self.store.whitelist(member.community).await {
            Ok(entries) => entries
                .iter()
                .any(|entry| entry.covers(member.member, &member.roles, now)),
            Err(err) => {
                tracing::warn!(
                    community = %member.community,
                    member = %member.member,
                    %err,
                    "whitelist read failed, continuing with scoring"
                );
                false
            }
        }
    }

    async fn load_config(&self, community: CommunityId) -> CommunityConfig {
        match self.store.community_config(community).await {
            Ok(Some(config)) => config,
            Ok(None) => CommunityConfig::default(),
            Err(err) => {
                tracing::warn!(%community, %err, "config read failed, using defaults");
                CommunityConfig::default()
            }
        }
    }

    /// Emit to the sink and mirror into the audit log; both best-effort.
    async fn record_event(&self, event: GateEvent) {
        self.events.emit(&event).await;
        let record = event.to_audit_record(self.clock.now_unix());
        if let Err(err) = self.store.append_audit(&record).await {
            tracing::warn!(kind = event.kind(), %err, "audit append failed");
        }
    }
}

/// Mode selection, in precedence order (age floor and whitelist are handled
/// before scoring ever runs).
fn select_mode(config: &CommunityConfig, level: RiskLevel) -> Option<ChallengeMode> {
    match config.profile {
        VerificationProfile::Ultra => Some(ChallengeMode::Web),
        VerificationProfile::High => Some(if level == RiskLevel::High {
            ChallengeMode::Web
        } else {
            ChallengeMode::Button
        }),
        VerificationProfile::Standard => match config.verification_method {
            VerificationMethod::Button => Some(ChallengeMode::Button),
            VerificationMethod::Code => Some(ChallengeMode::Code),
            VerificationMethod::Web => Some(ChallengeMode::Web),
            VerificationMethod::Auto => match level {
                RiskLevel::High => Some(ChallengeMode::Web),
                RiskLevel::Medium | RiskLevel::Elevated => Some(ChallengeMode::Button),
                RiskLevel::Low => None,
            },
        },
    }
}

fn community_name(config: &CommunityConfig, community: CommunityId) -> String {
    config
        .display_name
        .clone()
        .unwrap_or_else(|| format!("community {}", community))
}
