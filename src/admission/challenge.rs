//! Challenge artifacts: modes, secrets, and the per-pair lifecycle record.
//!
//! Only the one-way hash of a secret is persisted. The plaintext exists just
//! long enough to be embedded in the challenge message (code mode) or the
//! staff review link (web mode).

use crate::config::CommunityConfig;
use crate::member::{CommunityId, MemberId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Time-to-live of the staff review token issued for `web` challenges.
pub const REVIEW_TOKEN_TTL_SECS: u64 = 3_600;

/// How a pending member proves they are responsive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeMode {
    /// Interactive affordance; clicking it is the response.
    Button,
    /// Numeric code the member must echo back.
    Code,
    /// External staff review surface reached via a tokenized link.
    Web,
}

impl ChallengeMode {
    pub fn name(&self) -> &'static str {
        match self {
            ChallengeMode::Button => "button",
            ChallengeMode::Code => "code",
            ChallengeMode::Web => "web",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "button" => Some(ChallengeMode::Button),
            "code" => Some(ChallengeMode::Code),
            "web" => Some(ChallengeMode::Web),
            _ => None,
        }
    }
}

impl fmt::Display for ChallengeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Challenge lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Pending,
    Completed,
    Failed,
    Expired,
}

impl ChallengeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChallengeStatus::Pending)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChallengeStatus::Pending => "pending",
            ChallengeStatus::Completed => "completed",
            ChallengeStatus::Failed => "failed",
            ChallengeStatus::Expired => "expired",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "pending" => Some(ChallengeStatus::Pending),
            "completed" => Some(ChallengeStatus::Completed),
            "failed" => Some(ChallengeStatus::Failed),
            "expired" => Some(ChallengeStatus::Expired),
            _ => None,
        }
    }
}

/// Durable record of one in-flight challenge.
///
/// At most one row exists per (community, member); issuing a new challenge
/// deletes any prior row for the pair first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub community: CommunityId,
    pub member: MemberId,
    pub mode: ChallengeMode,
    /// SHA-256 of the lowercased secret, hex-encoded. `None` for button mode.
    pub secret_hash: Option<String>,
    /// Staff review token, web mode only.
    pub review_token: Option<String>,
    pub review_expires_at: Option<u64>,
    pub issued_at: u64,
    pub expires_at: u64,
    pub attempts: u32,
    pub max_attempts: u32,
    pub status: ChallengeStatus,
}

/// Plaintext material generated at issuance, never persisted.
#[derive(Debug, Clone)]
pub struct IssuedSecrets {
    /// Code-mode digits or opaque token, depending on mode.
    pub secret: Option<String>,
    /// Review token for the staff surface, web mode only.
    pub review_token: Option<String>,
}

impl Challenge {
    /// Build a fresh pending challenge plus its plaintext material.
    pub fn issue(
        community: CommunityId,
        member: MemberId,
        mode: ChallengeMode,
        config: &CommunityConfig,
        now: u64,
    ) -> (Self, IssuedSecrets) {
        let (secret, secret_hash) = match mode {
            ChallengeMode::Button => (None, None),
            ChallengeMode::Code => {
                let code = generate_code();
                let hash = hash_secret(&code);
                (Some(code), Some(hash))
            }
            ChallengeMode::Web => {
                let token = generate_token();
                let hash = hash_secret(&token);
                (Some(token), Some(hash))
            }
        };

        let review_token = matches!(mode, ChallengeMode::Web).then(generate_token);

        let challenge = Self {
            community,
            member,
            mode,
            secret_hash,
            review_token: review_token.clone(),
            review_expires_at: review_token
                .is_some()
                .then(|| now + REVIEW_TOKEN_TTL_SECS),
            issued_at: now,
            expires_at: now + config.challenge_ttl_secs(),
            attempts: 0,
            max_attempts: config.max_attempts,
            status: ChallengeStatus::Pending,
        };

        (
            challenge,
            IssuedSecrets {
                secret,
                review_token,
            },
        )
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }

    /// Case-insensitive comparison of a response against the stored hash.
    pub fn matches(&self, input: &str) -> bool {
        self.secret_hash
            .as_deref()
            .is_some_and(|stored| hash_secret(input.trim()) == stored)
    }

    /// Whether the review token is valid at `now` (web mode only).
    pub fn review_token_valid(&self, token: &str, now: u64) -> bool {
        self.review_token.as_deref() == Some(token)
            && self.review_expires_at.is_some_and(|t| now <= t)
    }

    /// Record a wrong response. Returns `true` when the attempt limit is
    /// reached and the challenge transitions to `Failed`.
    pub fn register_failure(&mut self) -> bool {
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            self.status = ChallengeStatus::Failed;
            true
        } else {
            false
        }
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }
}

/// SHA-256 of the lowercased input, hex-encoded.
///
/// Lowercasing before hashing is what makes response comparison
/// case-insensitive.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

/// 4-6 digit numeric code for `code` challenges.
fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(4..=6);
    (0..len).map(|_| char::from(b'0' + rng.gen_range(0..10))).collect()
}

/// Opaque random token (UUIDv4, hex without hyphens).
fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}
