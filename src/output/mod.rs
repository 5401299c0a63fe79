pub mod json;
pub mod table;

use anyhow::Result;

use crate::db::models::ExternalOrder;
use crate::db::DatabaseStats;
use crate::mailbox::MailboxLabel;
use crate::workflow::RunOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Table
        }
    }
}

pub fn format_run_outcome(format: OutputFormat, outcome: &RunOutcome) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_run_outcome(outcome)),
        OutputFormat::Json => json::format_run_outcome(outcome),
    }
}

pub fn format_labels(format: OutputFormat, labels: &[MailboxLabel]) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_labels(labels)),
        OutputFormat::Json => json::format_labels(labels),
    }
}

pub fn format_orders(format: OutputFormat, orders: &[ExternalOrder]) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_orders(orders)),
        OutputFormat::Json => json::format_orders(orders),
    }
}

pub fn format_stats(format: OutputFormat, stats: &DatabaseStats) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_stats(stats)),
        OutputFormat::Json => json::format_stats(stats),
    }
}
