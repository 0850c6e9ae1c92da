//! SQLite-backed `GateStore` (narthex.db).
//!
//! Schema is created on open with `CREATE TABLE IF NOT EXISTS`. Upserts use
//! `INSERT ... ON CONFLICT`; the challenge table is keyed by
//! (community, member) so the single-active-challenge invariant holds at the
//! storage layer. Structured payloads (reasons, evidence, config, audit) are
//! stored as JSON text.

use crate::admission::challenge::{Challenge, ChallengeMode, ChallengeStatus};
use crate::config::CommunityConfig;
use crate::member::{CommunityId, MemberId, RoleId};
use crate::risk::{RiskAssessment, RiskLevel};
use crate::store::traits::{GateStore, StoreError, StoreResult};
use crate::store::types::{
    AltFlag, AuditQuery, AuditRecord, ThreatRecord, ThreatSeverity, TrustRecord, WhitelistEntry,
    WhitelistSubject,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS community_config (
        community INTEGER PRIMARY KEY,
        config TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS trust_records (
        community INTEGER NOT NULL,
        member INTEGER NOT NULL,
        trust_score INTEGER NOT NULL,
        manual_override INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (community, member)
    )",
    "CREATE TABLE IF NOT EXISTS threats (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        member INTEGER NOT NULL,
        severity TEXT NOT NULL,
        kind TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE INDEX IF NOT EXISTS idx_threats_member ON threats (member, active)",
    "CREATE TABLE IF NOT EXISTS assessments (
        community INTEGER NOT NULL,
        member INTEGER NOT NULL,
        score INTEGER NOT NULL,
        level TEXT NOT NULL,
        account_age_days INTEGER NOT NULL,
        has_avatar INTEGER NOT NULL,
        mutual_communities INTEGER NOT NULL,
        join_velocity INTEGER NOT NULL,
        reasons TEXT NOT NULL,
        assessed_at INTEGER NOT NULL,
        PRIMARY KEY (community, member)
    )",
    "CREATE TABLE IF NOT EXISTS challenges (
        community INTEGER NOT NULL,
        member INTEGER NOT NULL,
        mode TEXT NOT NULL,
        secret_hash TEXT,
        review_token TEXT,
        review_expires_at INTEGER,
        issued_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL,
        status TEXT NOT NULL,
        PRIMARY KEY (community, member)
    )",
    "CREATE INDEX IF NOT EXISTS idx_challenges_status ON challenges (status, expires_at)",
    "CREATE TABLE IF NOT EXISTS alt_flags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        community INTEGER NOT NULL,
        member INTEGER NOT NULL,
        method TEXT NOT NULL,
        confidence REAL NOT NULL,
        evidence TEXT NOT NULL,
        flagged_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS whitelist (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        community INTEGER NOT NULL,
        subject_kind TEXT NOT NULL,
        subject_id INTEGER NOT NULL,
        expires_at INTEGER,
        added_by INTEGER,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        community INTEGER NOT NULL,
        member INTEGER,
        kind TEXT NOT NULL,
        payload TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_audit_community ON audit_log (community, timestamp)",
];

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and initialize the
    /// schema.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory SQLite database, for tests.
    ///
    /// Pinned to a single pooled connection: every `:memory:` connection is
    /// its own database, so a second connection would see an empty schema.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Seed a trust record (operator tooling and tests; the admission core
    /// never writes trust).
    pub async fn put_trust(
        &self,
        community: CommunityId,
        member: MemberId,
        record: TrustRecord,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO trust_records (community, member, trust_score, manual_override)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (community, member)
             DO UPDATE SET trust_score = excluded.trust_score,
                           manual_override = excluded.manual_override",
        )
        .bind(community.0 as i64)
        .bind(member.0 as i64)
        .bind(i64::from(record.trust_score))
        .bind(record.manual_override)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Seed a threat record (operator tooling and tests).
    pub async fn put_threat(&self, record: &ThreatRecord) -> StoreResult<()> {
        sqlx::query("INSERT INTO threats (member, severity, kind, active) VALUES (?, ?, ?, ?)")
            .bind(record.member.0 as i64)
            .bind(record.severity.name())
            .bind(&record.kind)
            .bind(record.active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_challenge(row: &SqliteRow) -> StoreResult<Challenge> {
    let mode: String = row.get("mode");
    let status: String = row.get("status");
    Ok(Challenge {
        community: CommunityId(row.get::<i64, _>("community") as u64),
        member: MemberId(row.get::<i64, _>("member") as u64),
        mode: ChallengeMode::parse(&mode)
            .ok_or_else(|| StoreError::Serialization(format!("unknown mode: {}", mode)))?,
        secret_hash: row.get("secret_hash"),
        review_token: row.get("review_token"),
        review_expires_at: row
            .get::<Option<i64>, _>("review_expires_at")
            .map(|t| t as u64),
        issued_at: row.get::<i64, _>("issued_at") as u64,
        expires_at: row.get::<i64, _>("expires_at") as u64,
        attempts: row.get::<i64, _>("attempts") as u32,
        max_attempts: row.get::<i64, _>("max_attempts") as u32,
        status: ChallengeStatus::parse(&status)
            .ok_or_else(|| StoreError::Serialization(format!("unknown status: {}", status)))?,
    })
}

fn row_to_assessment(row: &SqliteRow) -> StoreResult<RiskAssessment> {
    let level: String = row.get("level");
    let reasons: String = row.get("reasons");
    Ok(RiskAssessment {
        community: CommunityId(row.get::<i64, _>("community") as u64),
        member: MemberId(row.get::<i64, _>("member") as u64),
        score: row.get::<i64, _>("score") as u8,
        level: RiskLevel::parse(&level)
            .ok_or_else(|| StoreError::Serialization(format!("unknown level: {}", level)))?,
        account_age_days: row.get::<i64, _>("account_age_days") as u32,
        has_avatar: row.get("has_avatar"),
        mutual_communities: row.get::<i64, _>("mutual_communities") as u32,
        join_velocity: row.get::<i64, _>("join_velocity") as u32,
        reasons: serde_json::from_str(&reasons)?,
        assessed_at: row.get::<i64, _>("assessed_at") as u64,
    })
}

fn row_to_audit(row: &SqliteRow) -> StoreResult<AuditRecord> {
    let payload: String = row.get("payload");
    Ok(AuditRecord {
        community: CommunityId(row.get::<i64, _>("community") as u64),
        member: row.get::<Option<i64>, _>("member").map(|m| MemberId(m as u64)),
        kind: row.get("kind"),
        payload: serde_json::from_str(&payload)?,
        timestamp: row.get::<i64, _>("timestamp") as u64,
    })
}

#[async_trait]
impl GateStore for SqliteStore {
    async fn community_config(
        &self,
        community: CommunityId,
    ) -> StoreResult<Option<CommunityConfig>> {
        let row = sqlx::query("SELECT config FROM community_config WHERE community = ?")
            .bind(community.0 as i64)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let config: String = row.get("config");
                Ok(Some(serde_json::from_str(&config)?))
            }
            None => Ok(None),
        }
    }

    async fn put_community_config(
        &self,
        community: CommunityId,
        config: &CommunityConfig,
    ) -> StoreResult<()> {
        let config = serde_json::to_string(config)?;
        sqlx::query(
            "INSERT INTO community_config (community, config) VALUES (?, ?)
             ON CONFLICT (community) DO UPDATE SET config = excluded.config",
        )
        .bind(community.0 as i64)
        .bind(config)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn trust_record(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> StoreResult<Option<TrustRecord>> {
        let row = sqlx::query(
            "SELECT trust_score, manual_override FROM trust_records
             WHERE community = ? AND member = ?",
        )
        .bind(community.0 as i64)
        .bind(member.0 as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| TrustRecord {
            trust_score: row.get::<i64, _>("trust_score") as u8,
            manual_override: row.get("manual_override"),
        }))
    }

    async fn active_threats(&self, member: MemberId) -> StoreResult<Vec<ThreatRecord>> {
        let rows = sqlx::query(
            "SELECT member, severity, kind, active FROM threats
             WHERE member = ? AND active = 1",
        )
        .bind(member.0 as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let severity: String = row.get("severity");
                Ok(ThreatRecord {
                    member: MemberId(row.get::<i64, _>("member") as u64),
                    severity: ThreatSeverity::parse(&severity).ok_or_else(|| {
                        StoreError::Serialization(format!("unknown severity: {}", severity))
                    })?,
                    kind: row.get("kind"),
                    active: row.get("active"),
                })
            })
            .collect()
    }

    async fn upsert_assessment(&self, assessment: &RiskAssessment) -> StoreResult<()> {
        let reasons = serde_json::to_string(&assessment.reasons)?;
        sqlx::query(
            "INSERT INTO assessments (community, member, score, level, account_age_days,
                                      has_avatar, mutual_communities, join_velocity,
                                      reasons, assessed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (community, member) DO UPDATE SET
                 score = excluded.score,
                 level = excluded.level,
                 account_age_days = excluded.account_age_days,
                 has_avatar = excluded.has_avatar,
                 mutual_communities = excluded.mutual_communities,
                 join_velocity = excluded.join_velocity,
                 reasons = excluded.reasons,
                 assessed_at = excluded.assessed_at",
        )
        .bind(assessment.community.0 as i64)
        .bind(assessment.member.0 as i64)
        .bind(i64::from(assessment.score))
        .bind(assessment.level.name())
        .bind(i64::from(assessment.account_age_days))
        .bind(assessment.has_avatar)
        .bind(i64::from(assessment.mutual_communities))
        .bind(i64::from(assessment.join_velocity))
        .bind(reasons)
        .bind(assessment.assessed_at as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn assessment(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> StoreResult<Option<RiskAssessment>> {
        let row = sqlx::query("SELECT * FROM assessments WHERE community = ? AND member = ?")
            .bind(community.0 as i64)
            .bind(member.0 as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_assessment).transpose()
    }

    async fn challenge(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> StoreResult<Option<Challenge>> {
        let row = sqlx::query("SELECT * FROM challenges WHERE community = ? AND member = ?")
            .bind(community.0 as i64)
            .bind(member.0 as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_challenge).transpose()
    }

    async fn put_challenge(&self, challenge: &Challenge) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO challenges (community, member, mode, secret_hash, review_token,
                                     review_expires_at, issued_at, expires_at, attempts,
                                     max_attempts, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (community, member) DO UPDATE SET
                 mode = excluded.mode,
                 secret_hash = excluded.secret_hash,
                 review_token = excluded.review_token,
                 review_expires_at = excluded.review_expires_at,
                 issued_at = excluded.issued_at,
                 expires_at = excluded.expires_at,
                 attempts = excluded.attempts,
                 max_attempts = excluded.max_attempts,
                 status = excluded.status",
        )
        .bind(challenge.community.0 as i64)
        .bind(challenge.member.0 as i64)
        .bind(challenge.mode.name())
        .bind(&challenge.secret_hash)
        .bind(&challenge.review_token)
        .bind(challenge.review_expires_at.map(|t| t as i64))
        .bind(challenge.issued_at as i64)
        .bind(challenge.expires_at as i64)
        .bind(i64::from(challenge.attempts))
        .bind(i64::from(challenge.max_attempts))
        .bind(challenge.status.name())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_challenge(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> StoreResult<()> {
        sqlx::query("DELETE FROM challenges WHERE community = ? AND member = ?")
            .bind(community.0 as i64)
            .bind(member.0 as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn expired_pending_challenges(&self, now: u64) -> StoreResult<Vec<Challenge>> {
        let rows = sqlx::query(
            "SELECT * FROM challenges WHERE status = 'pending' AND expires_at < ?",
        )
        .bind(now as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_challenge).collect()
    }

    async fn pending_challenges(&self, community: CommunityId) -> StoreResult<Vec<Challenge>> {
        let rows = sqlx::query(
            "SELECT * FROM challenges WHERE community = ? AND status = 'pending'",
        )
        .bind(community.0 as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_challenge).collect()
    }

    async fn append_alt_flag(&self, flag: &AltFlag) -> StoreResult<()> {
        let evidence = serde_json::to_string(&flag.evidence)?;
        sqlx::query(
            "INSERT INTO alt_flags (community, member, method, confidence, evidence, flagged_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(flag.community.0 as i64)
        .bind(flag.member.0 as i64)
        .bind(&flag.method)
        .bind(flag.confidence)
        .bind(evidence)
        .bind(flag.flagged_at as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn whitelist(&self, community: CommunityId) -> StoreResult<Vec<WhitelistEntry>> {
        let rows = sqlx::query("SELECT * FROM whitelist WHERE community = ?")
            .bind(community.0 as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let kind: String = row.get("subject_kind");
                let id = row.get::<i64, _>("subject_id") as u64;
                let subject = match kind.as_str() {
                    "member" => WhitelistSubject::Member(MemberId(id)),
                    "role" => WhitelistSubject::Role(RoleId(id)),
                    other => {
                        return Err(StoreError::Serialization(format!(
                            "unknown whitelist subject: {}",
                            other
                        )))
                    }
                };
                Ok(WhitelistEntry {
                    community: CommunityId(row.get::<i64, _>("community") as u64),
                    subject,
                    expires_at: row.get::<Option<i64>, _>("expires_at").map(|t| t as u64),
                    added_by: row
                        .get::<Option<i64>, _>("added_by")
                        .map(|m| MemberId(m as u64)),
                    created_at: row.get::<i64, _>("created_at") as u64,
                })
            })
            .collect()
    }

    async fn add_whitelist_entry(&self, entry: &WhitelistEntry) -> StoreResult<()> {
        let (kind, id) = match entry.subject {
            WhitelistSubject::Member(m) => ("member", m.0),
            WhitelistSubject::Role(r) => ("role", r.0),
        };
        sqlx::query(
            "INSERT INTO whitelist (community, subject_kind, subject_id, expires_at,
                                    added_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.community.0 as i64)
        .bind(kind)
        .bind(id as i64)
        .bind(entry.expires_at.map(|t| t as i64))
        .bind(entry.added_by.map(|m| m.0 as i64))
        .bind(entry.created_at as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_whitelist_entry(
        &self,
        community: CommunityId,
        subject: WhitelistSubject,
    ) -> StoreResult<()> {
        let (kind, id) = match subject {
            WhitelistSubject::Member(m) => ("member", m.0),
            WhitelistSubject::Role(r) => ("role", r.0),
        };
        sqlx::query(
            "DELETE FROM whitelist WHERE community = ? AND subject_kind = ? AND subject_id = ?",
        )
        .bind(community.0 as i64)
        .bind(kind)
        .bind(id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_audit(&self, record: &AuditRecord) -> StoreResult<()> {
        let payload = serde_json::to_string(&record.payload)?;
        sqlx::query(
            "INSERT INTO audit_log (community, member, kind, payload, timestamp)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(record.community.0 as i64)
        .bind(record.member.map(|m| m.0 as i64))
        .bind(&record.kind)
        .bind(payload)
        .bind(record.timestamp as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn audit_log(
        &self,
        community: CommunityId,
        query: &AuditQuery,
    ) -> StoreResult<Vec<AuditRecord>> {
        // Filters are optional; build the WHERE clause incrementally.
        let mut sql = String::from("SELECT * FROM audit_log WHERE community = ?");
        if query.kind.is_some() {
            sql.push_str(" AND kind = ?");
        }
        if query.member.is_some() {
            sql.push_str(" AND member = ?");
        }
        if query.after.is_some() {
            sql.push_str(" AND timestamp > ?");
        }
        sql.push_str(" ORDER BY timestamp DESC");
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query(&sql).bind(community.0 as i64);
        if let Some(kind) = &query.kind {
            q = q.bind(kind.clone());
        }
        if let Some(member) = query.member {
            q = q.bind(member.0 as i64);
        }
        if let Some(after) = query.after {
            q = q.bind(after as i64);
        }
        if let Some(limit) = query.limit {
            q = q.bind(limit as i64);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_audit).collect()
    }
}
