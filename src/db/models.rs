use rusqlite::{Result as SqlResult, Row};
use serde::{Deserialize, Serialize};

/// One spreadsheet row accepted into the order tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalOrder {
    pub external_ref: String,
    pub channel_id: String,
    pub order_number: String,
    pub batch_id: Option<i64>,
    pub payload: serde_json::Value,
    pub imported_at: String,
}

/// Order row as produced by the importer, before it is tied to a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub external_ref: String,
    pub order_number: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImportBatch {
    pub source_message_id: String,
    pub channel_id: String,
    pub synch_type: String,
    pub source_file: String,
    pub message_date: Option<String>,
    pub rows_read: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportBatch {
    pub id: i64,
    pub source_message_id: String,
    pub channel_id: String,
    pub synch_type: String,
    pub source_file: String,
    pub message_date: Option<String>,
    pub rows_read: i64,
    pub orders_imported: i64,
    pub duplicates_skipped: i64,
    pub imported_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncState {
    pub key: String,
    pub value: Option<String>,
    pub updated_at: Option<String>,
}

fn parse_json_value(raw: String) -> serde_json::Value {
    serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null)
}

impl ExternalOrder {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            external_ref: row.get("external_ref")?,
            channel_id: row.get("channel_id")?,
            order_number: row.get("order_number")?,
            batch_id: row.get("batch_id")?,
            payload: parse_json_value(row.get("payload")?),
            imported_at: row.get("imported_at")?,
        })
    }
}

impl ImportBatch {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            source_message_id: row.get("source_message_id")?,
            channel_id: row.get("channel_id")?,
            synch_type: row.get("synch_type")?,
            source_file: row.get("source_file")?,
            message_date: row.get("message_date")?,
            rows_read: row.get("rows_read")?,
            orders_imported: row.get("orders_imported")?,
            duplicates_skipped: row.get("duplicates_skipped")?,
            imported_at: row.get("imported_at")?,
        })
    }
}

impl SyncState {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            key: row.get("key")?,
            value: row.get("value")?,
            updated_at: row.get("updated_at")?,
        })
    }
}
