//! In-memory `GateStore` for tests and embedding.
//!
//! Mirrors the SQLite store's semantics (single challenge row per pair,
//! append-only logs) and adds failure injection so the fail-open branches
//! of the admission path are testable.

use crate::admission::challenge::{Challenge, ChallengeStatus};
use crate::config::CommunityConfig;
use crate::member::{CommunityId, MemberId};
use crate::risk::RiskAssessment;
use crate::store::traits::{GateStore, StoreError, StoreResult};
use crate::store::types::{
    AltFlag, AuditQuery, AuditRecord, ThreatRecord, TrustRecord, WhitelistEntry, WhitelistSubject,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    configs: HashMap<CommunityId, CommunityConfig>,
    trust: HashMap<(CommunityId, MemberId), TrustRecord>,
    threats: Vec<ThreatRecord>,
    assessments: HashMap<(CommunityId, MemberId), RiskAssessment>,
    challenges: HashMap<(CommunityId, MemberId), Challenge>,
    alt_flags: Vec<AltFlag>,
    whitelist: Vec<WhitelistEntry>,
    audit: Vec<AuditRecord>,
}

/// In-memory store with failure injection.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    fail_trust: Arc<AtomicBool>,
    fail_threats: Arc<AtomicBool>,
    fail_challenges: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make trust reads fail until cleared.
    pub fn set_fail_trust(&self, fail: bool) {
        self.fail_trust.store(fail, Ordering::SeqCst);
    }

    /// Make threat reads fail until cleared.
    pub fn set_fail_threats(&self, fail: bool) {
        self.fail_threats.store(fail, Ordering::SeqCst);
    }

    /// Make challenge reads fail until cleared.
    pub fn set_fail_challenges(&self, fail: bool) {
        self.fail_challenges.store(fail, Ordering::SeqCst);
    }

    /// Make assessment/alt-flag/audit writes fail until cleared.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Seed a trust record (test setup).
    pub fn put_trust(&self, community: CommunityId, member: MemberId, record: TrustRecord) {
        self.inner
            .lock()
            .unwrap()
            .trust
            .insert((community, member), record);
    }

    /// Seed a threat record (test setup).
    pub fn put_threat(&self, record: ThreatRecord) {
        self.inner.lock().unwrap().threats.push(record);
    }

    pub fn alt_flags(&self) -> Vec<AltFlag> {
        self.inner.lock().unwrap().alt_flags.clone()
    }

    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.inner.lock().unwrap().audit.clone()
    }

    /// Number of challenge rows for a pair (0 or 1 by construction).
    pub fn challenge_rows(&self, community: CommunityId, member: MemberId) -> usize {
        usize::from(
            self.inner
                .lock()
                .unwrap()
                .challenges
                .contains_key(&(community, member)),
        )
    }

    fn write_guard(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl GateStore for MemoryStore {
    async fn community_config(
        &self,
        community: CommunityId,
    ) -> StoreResult<Option<CommunityConfig>> {
        Ok(self.inner.lock().unwrap().configs.get(&community).cloned())
    }

    async fn put_community_config(
        &self,
        community: CommunityId,
        config: &CommunityConfig,
    ) -> StoreResult<()> {
        self.write_guard()?;
        self.inner
            .lock()
            .unwrap()
            .configs
            .insert(community, config.clone());
        Ok(())
    }

    async fn trust_record(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> StoreResult<Option<TrustRecord>> {
        if self.fail_trust.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected trust failure".to_string()));
        }
        Ok(self
            .inner
            .lock()
            .unwrap()
            .trust
            .get(&(community, member))
            .copied())
    }

    async fn active_threats(&self, member: MemberId) -> StoreResult<Vec<ThreatRecord>> {
        if self.fail_threats.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "injected threat failure".to_string(),
            ));
        }
        Ok(self
            .inner
            .lock()
            .unwrap()
            .threats
            .iter()
            .filter(|t| t.member == member && t.active)
            .cloned()
            .collect())
    }

    async fn upsert_assessment(&self, assessment: &RiskAssessment) -> StoreResult<()> {
        self.write_guard()?;
        self.inner
            .lock()
            .unwrap()
            .assessments
            .insert((assessment.community, assessment.member), assessment.clone());
        Ok(())
    }

    async fn assessment(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> StoreResult<Option<RiskAssessment>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .assessments
            .get(&(community, member))
            .cloned())
    }

    async fn challenge(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> StoreResult<Option<Challenge>> {
        if self.fail_challenges.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "injected challenge failure".to_string(),
            ));
        }
        Ok(self
            .inner
            .lock()
            .unwrap()
            .challenges
            .get(&(community, member))
            .cloned())
    }

    async fn put_challenge(&self, challenge: &Challenge) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .challenges
            .insert((challenge.community, challenge.member), challenge.clone());
        Ok(())
    }

    async fn delete_challenge(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .challenges
            .remove(&(community, member));
        Ok(())
    }

    async fn expired_pending_challenges(&self, now: u64) -> StoreResult<Vec<Challenge>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .challenges
            .values()
            .filter(|c| c.status == ChallengeStatus::Pending && c.expires_at < now)
            .cloned()
            .collect())
    }

    async fn pending_challenges(&self, community: CommunityId) -> StoreResult<Vec<Challenge>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .challenges
            .values()
            .filter(|c| c.community == community && c.status == ChallengeStatus::Pending)
            .cloned()
            .collect())
    }

    async fn append_alt_flag(&self, flag: &AltFlag) -> StoreResult<()> {
        self.write_guard()?;
        self.inner.lock().unwrap().alt_flags.push(flag.clone());
        Ok(())
    }

    async fn whitelist(&self, community: CommunityId) -> StoreResult<Vec<WhitelistEntry>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .whitelist
            .iter()
            .filter(|e| e.community == community)
            .cloned()
            .collect())
    }

    async fn add_whitelist_entry(&self, entry: &WhitelistEntry) -> StoreResult<()> {
        self.write_guard()?;
        self.inner.lock().unwrap().whitelist.push(entry.clone());
        Ok(())
    }

    async fn remove_whitelist_entry(
        &self,
        community: CommunityId,
        subject: WhitelistSubject,
    ) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .whitelist
            .retain(|e| !(e.community == community && e.subject == subject));
        Ok(())
    }

    async fn append_audit(&self, record: &AuditRecord) -> StoreResult<()> {
        self.write_guard()?;
        self.inner.lock().unwrap().audit.push(record.clone());
        Ok(())
    }

    async fn audit_log(
        &self,
        community: CommunityId,
        query: &AuditQuery,
    ) -> StoreResult<Vec<AuditRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut records: Vec<AuditRecord> = inner
            .audit
            .iter()
            .filter(|r| r.community == community)
            .filter(|r| query.kind.as_deref().is_none_or(|k| r.kind == k))
            .filter(|r| query.member.is_none_or(|m| r.member == Some(m)))
            .filter(|r| query.after.is_none_or(|t| r.timestamp > t))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}
