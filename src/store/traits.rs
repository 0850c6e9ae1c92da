//! Trait abstraction over the persistent store.
//!
//! Callers on the admission path treat every read as fallible and substitute
//! neutral defaults on error (trust 80, no threats): the gate fails open
//! rather than blocking a join on a store outage. Writes on that path are
//! best-effort; failures are logged and the flow continues.

use crate::admission::challenge::Challenge;
use crate::config::CommunityConfig;
use crate::member::{CommunityId, MemberId};
use crate::risk::RiskAssessment;
use crate::store::types::{
    AltFlag, AuditQuery, AuditRecord, ThreatRecord, TrustRecord, WhitelistEntry, WhitelistSubject,
};
use async_trait::async_trait;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Persistent store for admission records, keyed by (community, member).
///
/// Per-key writes use upsert or delete-then-insert semantics, so no
/// multi-step operation needs a transaction spanning records; partial
/// failure degrades gracefully instead of corrupting state.
#[async_trait]
pub trait GateStore: Send + Sync {
    /// Per-community admission policy. `None` falls back to defaults.
    async fn community_config(&self, community: CommunityId)
        -> StoreResult<Option<CommunityConfig>>;

    async fn put_community_config(
        &self,
        community: CommunityId,
        config: &CommunityConfig,
    ) -> StoreResult<()>;

    /// Long-lived trust record; read-only to the admission core.
    async fn trust_record(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> StoreResult<Option<TrustRecord>>;

    /// Active threat intelligence for a member (global, not community-scoped).
    async fn active_threats(&self, member: MemberId) -> StoreResult<Vec<ThreatRecord>>;

    /// Idempotent upsert of the latest assessment for the pair.
    async fn upsert_assessment(&self, assessment: &RiskAssessment) -> StoreResult<()>;

    async fn assessment(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> StoreResult<Option<RiskAssessment>>;

    /// The single challenge row for a pair, in any status.
    async fn challenge(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> StoreResult<Option<Challenge>>;

    /// Upsert the challenge row for its (community, member) pair.
    async fn put_challenge(&self, challenge: &Challenge) -> StoreResult<()>;

    async fn delete_challenge(&self, community: CommunityId, member: MemberId)
        -> StoreResult<()>;

    /// Pending challenges whose expiry is strictly before `now`, across all
    /// communities; used by the periodic sweep.
    async fn expired_pending_challenges(&self, now: u64) -> StoreResult<Vec<Challenge>>;

    /// Pending challenges for one community, for status reporting.
    async fn pending_challenges(&self, community: CommunityId) -> StoreResult<Vec<Challenge>>;

    /// Append-only duplicate-account flag.
    async fn append_alt_flag(&self, flag: &AltFlag) -> StoreResult<()>;

    /// All whitelist entries for a community, including expired ones;
    /// callers filter with `WhitelistEntry::covers`.
    async fn whitelist(&self, community: CommunityId) -> StoreResult<Vec<WhitelistEntry>>;

    async fn add_whitelist_entry(&self, entry: &WhitelistEntry) -> StoreResult<()>;

    async fn remove_whitelist_entry(
        &self,
        community: CommunityId,
        subject: WhitelistSubject,
    ) -> StoreResult<()>;

    /// Append-only audit log mirroring emitted gate events.
    async fn append_audit(&self, record: &AuditRecord) -> StoreResult<()>;

    async fn audit_log(
        &self,
        community: CommunityId,
        query: &AuditQuery,
    ) -> StoreResult<Vec<AuditRecord>>;
}
