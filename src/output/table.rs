use chrono::{DateTime, Utc};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::db::models::ExternalOrder;
use crate::db::DatabaseStats;
use crate::mailbox::MailboxLabel;
use crate::workflow::RunOutcome;

const REF_WIDTH: usize = 20;
const CHANNEL_WIDTH: usize = 14;
const BATCH_WIDTH: usize = 6;
const IMPORTED_WIDTH: usize = 12;
const LABEL_ID_WIDTH: usize = 24;
const LABEL_NAME_WIDTH: usize = 40;

pub fn format_run_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::NoCandidateMessages => "No candidate messages.".to_string(),
        RunOutcome::EmptyDataset {
            message_id,
            empty_label_applied,
        } => {
            let mut out = format!("Message {message_id}: attachment has no orders.\n");
            if *empty_label_applied {
                out.push_str("Empty-sheet labels applied.\n");
            } else {
                out.push_str("Message keeps its failed label.\n");
            }
            out
        }
        RunOutcome::Imported {
            message_id,
            message_date,
            attachment,
            rows,
            import,
        } => {
            let mut out = String::new();
            out.push_str(&format!("Message:    {message_id}\n"));
            out.push_str(&format!("Date:       {message_date}\n"));
            out.push_str(&format!("Attachment: {attachment}\n"));
            out.push_str(&format!("Rows:       {rows}\n"));
            out.push_str(&format!("Batch:      {}\n", import.batch_id));
            out.push_str(&format!("Imported:   {}\n", import.orders_imported));
            out.push_str(&format!("Duplicates: {}\n", import.duplicates_skipped));
            out
        }
    }
}

pub fn format_labels(labels: &[MailboxLabel]) -> String {
    if labels.is_empty() {
        return "No labels found.".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<id$}  {:<name$}  Type\n",
        "ID",
        "Name",
        id = LABEL_ID_WIDTH,
        name = LABEL_NAME_WIDTH
    ));
    out.push_str(&format!(
        "{}  {}  ------\n",
        "-".repeat(LABEL_ID_WIDTH),
        "-".repeat(LABEL_NAME_WIDTH)
    ));

    for label in labels {
        out.push_str(&format!(
            "{:<id$}  {:<name$}  {}\n",
            truncate_for_width(&label.id, LABEL_ID_WIDTH),
            truncate_for_width(&label.name, LABEL_NAME_WIDTH),
            label.label_type.as_deref().unwrap_or("-"),
            id = LABEL_ID_WIDTH,
            name = LABEL_NAME_WIDTH
        ));
    }

    out
}

pub fn format_orders(orders: &[ExternalOrder]) -> String {
    if orders.is_empty() {
        return "No orders found.".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<r$}  {:<c$}  {:>b$}  {:<i$}\n",
        "Order",
        "Channel",
        "Batch",
        "Imported",
        r = REF_WIDTH,
        c = CHANNEL_WIDTH,
        b = BATCH_WIDTH,
        i = IMPORTED_WIDTH
    ));
    out.push_str(&format!(
        "{}  {}  {}  {}\n",
        "-".repeat(REF_WIDTH),
        "-".repeat(CHANNEL_WIDTH),
        "-".repeat(BATCH_WIDTH),
        "-".repeat(IMPORTED_WIDTH)
    ));

    for order in orders {
        let batch = order
            .batch_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<r$}  {:<c$}  {:>b$}  {:<i$}\n",
            truncate_for_width(&order.external_ref, REF_WIDTH),
            truncate_for_width(&order.channel_id, CHANNEL_WIDTH),
            batch,
            truncate_for_width(&relative_date(&order.imported_at), IMPORTED_WIDTH),
            r = REF_WIDTH,
            c = CHANNEL_WIDTH,
            b = BATCH_WIDTH,
            i = IMPORTED_WIDTH
        ));
    }

    out
}

pub fn format_stats(stats: &DatabaseStats) -> String {
    let mut out = String::new();
    out.push_str("Order Stats\n");
    out.push_str("===========\n");
    out.push_str(&format!("Orders:  {}\n", stats.total_orders));
    out.push_str(&format!("Batches: {}\n", stats.total_batches));

    if !stats.orders_by_channel.is_empty() {
        out.push('\n');
        out.push_str("Orders by channel\n");
        out.push_str("-----------------\n");
        for row in &stats.orders_by_channel {
            out.push_str(&format!("{:<24} {:>8}\n", row.channel_id, row.count));
        }
    }

    out
}

fn relative_date(input: &str) -> String {
    let Ok(parsed) = DateTime::parse_from_rfc3339(input) else {
        return input.to_string();
    };

    let delta = Utc::now().signed_duration_since(parsed.with_timezone(&Utc));
    match delta {
        d if d.num_seconds() < 0 => "in future".to_string(),
        d if d.num_minutes() < 1 => "just now".to_string(),
        d if d.num_hours() < 1 => format!("{}m ago", d.num_minutes()),
        d if d.num_hours() < 24 => format!("{}h ago", d.num_hours()),
        d if d.num_days() < 7 => format!("{}d ago", d.num_days()),
        _ => parsed.format("%Y-%m-%d").to_string(),
    }
}

fn truncate_for_width(value: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(value) <= max_width {
        return value.to_string();
    }
    if max_width <= 1 {
        return "…".to_string();
    }

    let mut out = String::new();
    let mut width = 0usize;
    for c in value.chars() {
        let cw = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + cw + 1 > max_width {
            break;
        }
        out.push(c);
        width += cw;
    }
    out.push('…');
    out
}
