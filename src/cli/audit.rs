//! Audit log query (operator's view of the admission trail).

use super::config::NarthexConfig;
use super::CliError;
use narthex::clock::{Clock, SystemClock};
use narthex::member::CommunityId;
use narthex::store::{AuditQuery, AuditRecord, GateStore, SqliteStore};

pub async fn execute(
    config: &NarthexConfig,
    community: u64,
    kind: Option<String>,
    limit: usize,
) -> Result<(), CliError> {
    let store = SqliteStore::open(&config.database).await?;

    let records = store
        .audit_log(
            CommunityId(community),
            &AuditQuery {
                kind,
                limit: Some(limit),
                ..Default::default()
            },
        )
        .await?;

    println!("{}", format_audit_log(&records, SystemClock.now_unix()));
    Ok(())
}

/// Render audit records, most recent first.
fn format_audit_log(records: &[AuditRecord], now: u64) -> String {
    if records.is_empty() {
        return "No audit entries found.".to_string();
    }

    let mut output = String::from("📋 Admission Audit Trail\n\n");
    for record in records {
        let member = record
            .member
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!(
            "• {} — {} (member {})\n  {}\n\n",
            format_relative(record.timestamp, now),
            record.kind,
            member,
            record.payload
        ));
    }
    output.trim_end().to_string()
}

/// Relative time for recent entries, absolute for old ones.
fn format_relative(timestamp: u64, now: u64) -> String {
    if now < timestamp {
        return format!("Unix: {}", timestamp);
    }
    match now - timestamp {
        0..=60 => "Just now".to_string(),
        61..=3600 => format!("{} min ago", (now - timestamp) / 60),
        3601..=86400 => format!("{} hours ago", (now - timestamp) / 3600),
        86401..=604800 => format!("{} days ago", (now - timestamp) / 86400),
        _ => format!("Unix: {}", timestamp),
    }
}
