use anyhow::Result;

use crate::db::models::ExternalOrder;
use crate::db::DatabaseStats;
use crate::mailbox::MailboxLabel;
use crate::workflow::RunOutcome;

pub fn format_run_outcome(outcome: &RunOutcome) -> Result<String> {
    Ok(serde_json::to_string_pretty(outcome)?)
}

pub fn format_labels(labels: &[MailboxLabel]) -> Result<String> {
    Ok(serde_json::to_string_pretty(labels)?)
}

pub fn format_orders(orders: &[ExternalOrder]) -> Result<String> {
    Ok(serde_json::to_string_pretty(orders)?)
}

pub fn format_stats(stats: &DatabaseStats) -> Result<String> {
    Ok(serde_json::to_string_pretty(stats)?)
}
