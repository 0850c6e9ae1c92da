//! Offline expiry sweep.
//!
//! Terminalizes pending challenges whose expiry has passed, directly against
//! the store. Member notification happens in the embedding runtime (which
//! owns a chat client); the operator sweep only guarantees that abandoned
//! challenges never linger as `pending`.

use super::config::NarthexConfig;
use super::CliError;
use narthex::admission::ChallengeStatus;
use narthex::clock::{Clock, SystemClock};
use narthex::events::GateEvent;
use narthex::store::{GateStore, SqliteStore};
use tracing::{info, warn};

pub async fn execute(config: &NarthexConfig, watch: bool) -> Result<(), CliError> {
    let store = SqliteStore::open(&config.database).await?;

    if !watch {
        let count = sweep_once(&store).await?;
        println!("Expired {} challenge(s).", count);
        return Ok(());
    }

    let interval = config.sweep_interval()?;
    info!(interval_secs = interval.as_secs(), "sweep watch started");
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match sweep_once(&store).await {
            Ok(0) => {}
            Ok(count) => info!(count, "expired challenges"),
            Err(err) => warn!(%err, "sweep pass failed"),
        }
    }
}

async fn sweep_once(store: &SqliteStore) -> Result<usize, CliError> {
    let now = SystemClock.now_unix();
    let expired = store.expired_pending_challenges(now).await?;
    let count = expired.len();

    for mut challenge in expired {
        challenge.status = ChallengeStatus::Expired;
        store.put_challenge(&challenge).await?;

        let event = GateEvent::ChallengeExpired {
            community: challenge.community,
            member: challenge.member,
        };
        if let Err(err) = store.append_audit(&event.to_audit_record(now)).await {
            warn!(%err, "audit append failed");
        }
    }

    Ok(count)
}
