//! Per-community admission policy.
//!
//! One typed configuration struct per community, loaded from the store once
//! per evaluation. Trust model parameters live here; process-level settings
//! (database path, log filter) are operator configuration and live in
//! `narthex.toml` (see `cli::config`).

use crate::member::RoleId;
use serde::{Deserialize, Serialize};

/// Default challenge time-to-live in minutes.
pub const DEFAULT_CHALLENGE_TIMEOUT_MINUTES: u32 = 10;

/// Default maximum number of wrong responses before lockout.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Policy tier controlling default strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationProfile {
    #[default]
    Standard,
    High,
    Ultra,
}

/// Explicitly configured challenge method.
///
/// `Auto` derives the mode from the fused risk level at join time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    #[default]
    Auto,
    Button,
    Code,
    Web,
}

/// Admission policy for a single community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityConfig {
    /// Human-readable community name used in challenge messages.
    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub profile: VerificationProfile,

    /// Hard account-age floor in days. 0 disables the floor.
    #[serde(default)]
    pub min_account_age_days: u32,

    /// Remove members failing the age floor instead of just rejecting.
    #[serde(default)]
    pub auto_kick_on_age_fail: bool,

    #[serde(default)]
    pub verification_method: VerificationMethod,

    /// Opt into trust/threat fusion even on the `standard` profile.
    #[serde(default)]
    pub enable_advanced_scan: bool,

    #[serde(default = "default_challenge_timeout")]
    pub challenge_timeout_minutes: u32,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Role applied while a challenge is pending.
    #[serde(default)]
    pub restricted_role_id: Option<RoleId>,

    /// Role granted on successful verification.
    #[serde(default)]
    pub verified_role_id: Option<RoleId>,

    #[serde(default = "default_true")]
    pub enable_staff_escalation: bool,
}

fn default_challenge_timeout() -> u32 {
    DEFAULT_CHALLENGE_TIMEOUT_MINUTES
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_true() -> bool {
    true
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            display_name: None,
            profile: VerificationProfile::Standard,
            min_account_age_days: 0,
            auto_kick_on_age_fail: false,
            verification_method: VerificationMethod::Auto,
            enable_advanced_scan: false,
            challenge_timeout_minutes: DEFAULT_CHALLENGE_TIMEOUT_MINUTES,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            restricted_role_id: None,
            verified_role_id: None,
            enable_staff_escalation: true,
        }
    }
}

impl CommunityConfig {
    /// Whether trust/threat fusion runs for this community.
    ///
    /// Advanced scanning is implied by the `high` and `ultra` profiles and
    /// opt-in for `standard`.
    pub fn advanced_scan_enabled(&self) -> bool {
        matches!(
            self.profile,
            VerificationProfile::High | VerificationProfile::Ultra
        ) || self.enable_advanced_scan
    }

    /// Challenge time-to-live in seconds.
    pub fn challenge_ttl_secs(&self) -> u64 {
        u64::from(self.challenge_timeout_minutes) * 60
    }
}
