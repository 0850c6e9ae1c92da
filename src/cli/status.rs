//! Per-community status summary.

use super::config::NarthexConfig;
use super::CliError;
use narthex::clock::{Clock, SystemClock};
use narthex::config::CommunityConfig;
use narthex::member::CommunityId;
use narthex::store::{GateStore, SqliteStore};

pub async fn execute(config: &NarthexConfig, community: u64) -> Result<(), CliError> {
    let store = SqliteStore::open(&config.database).await?;
    let community = CommunityId(community);

    let policy = store
        .community_config(community)
        .await?
        .unwrap_or_default();
    let pending = store.pending_challenges(community).await?;
    let now = SystemClock.now_unix();

    println!("{}", format_status(community, &policy, &pending, now));
    Ok(())
}

fn format_status(
    community: CommunityId,
    policy: &CommunityConfig,
    pending: &[narthex::admission::Challenge],
    now: u64,
) -> String {
    let mut output = format!(
        "Community {}\n\
         Profile: {:?}\n\
         Method: {:?}\n\
         Advanced scan: {}\n\
         Challenge TTL: {} min, max attempts: {}\n\
         Staff escalation: {}\n\n\
         Pending challenges: {}\n",
        community,
        policy.profile,
        policy.verification_method,
        policy.advanced_scan_enabled(),
        policy.challenge_timeout_minutes,
        policy.max_attempts,
        policy.enable_staff_escalation,
        pending.len()
    );

    for challenge in pending {
        let remaining = challenge.expires_at.saturating_sub(now);
        output.push_str(&format!(
            "  • member {} — {} mode, {} attempt(s) used, expires in {}s\n",
            challenge.member,
            challenge.mode,
            challenge.attempts,
            remaining
        ));
    }

    output.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use narthex::admission::{Challenge, ChallengeMode};
    use narthex::member::MemberId;

    #[test]
    fn test_format_status_lists_pending() {
        let policy = CommunityConfig::default();
        let (challenge, _) = Challenge::issue(
            CommunityId(1),
            MemberId(42),
            ChallengeMode::Button,
            &policy,
            1_000,
        );

        let output = format_status(CommunityId(1), &policy, &[challenge], 1_100);
        assert!(output.contains("Pending challenges: 1"));
        assert!(output.contains("member 42"));
        assert!(output.contains("button mode"));
        assert!(output.contains("expires in 500s"));
    }

    #[test]
    fn test_format_status_empty() {
        let output = format_status(CommunityId(1), &CommunityConfig::default(), &[], 0);
        assert!(output.contains("Pending challenges: 0"));
    }
}
