use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::config::SalesChannel;
use crate::dataset::{Dataset, DatasetError};
use crate::db::models::{NewImportBatch, NewOrder};
use crate::db::{Database, DbError};
use crate::validator::DEFAULT_ORDER_COLUMN;

pub const SYNCH_TYPE_GMAIL: &str = "gmail";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("read staged sheet: {0}")]
    Dataset(#[from] DatasetError),

    #[error("write orders: {0}")]
    Db(#[from] DbError),

    #[error("staged sheet has no '{0}' column")]
    MissingColumn(String),

    #[error("row {row} has an empty order reference")]
    EmptyOrderReference { row: usize },
}

/// Where the rows being imported came from.
#[derive(Debug, Clone, Copy)]
pub struct ImportContext<'a> {
    pub channel: &'a SalesChannel,
    pub source_message_id: &'a str,
    pub message_date: &'a str,
    pub synch_type: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub batch_id: i64,
    pub rows_read: usize,
    pub orders_imported: usize,
    pub duplicates_skipped: usize,
}

pub trait OrderImporter {
    fn import(&self, staged: &Path, context: &ImportContext<'_>)
        -> Result<ImportReport, ImportError>;
}

/// Imports every data row of the staged sheet as an order in one transaction.
pub struct SqliteOrderImporter<'a> {
    db: &'a Database,
    order_column: String,
}

impl<'a> SqliteOrderImporter<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            order_column: DEFAULT_ORDER_COLUMN.to_string(),
        }
    }

    pub fn with_order_column(mut self, order_column: impl Into<String>) -> Self {
        self.order_column = order_column.into();
        self
    }

    fn orders(
        &self,
        dataset: &Dataset,
        channel: &SalesChannel,
    ) -> Result<Vec<NewOrder>, ImportError> {
        let order_index = dataset
            .column_index(&self.order_column)
            .ok_or_else(|| ImportError::MissingColumn(self.order_column.clone()))?;

        (0..dataset.data_row_count())
            .map(|row| {
                let order_number = dataset.cell(row, order_index);
                if order_number.is_empty() {
                    return Err(ImportError::EmptyOrderReference { row: row + 2 });
                }
                Ok(NewOrder {
                    external_ref: channel.external_ref(order_number),
                    order_number: order_number.to_string(),
                    payload: Value::Object(dataset.record(row)),
                })
            })
            .collect()
    }
}

impl OrderImporter for SqliteOrderImporter<'_> {
    fn import(
        &self,
        staged: &Path,
        context: &ImportContext<'_>,
    ) -> Result<ImportReport, ImportError> {
        let dataset = Dataset::open(staged)?;
        let orders = self.orders(&dataset, context.channel)?;

        let batch = NewImportBatch {
            source_message_id: context.source_message_id.to_string(),
            channel_id: context.channel.channel_id.clone(),
            synch_type: context.synch_type.to_string(),
            source_file: staged.display().to_string(),
            message_date: Some(context.message_date.to_string()),
            rows_read: orders.len() as i64,
        };
        let recorded = self.db.import_orders(&batch, &orders)?;

        info!(
            batch_id = recorded.id,
            channel_id = %recorded.channel_id,
            imported = recorded.orders_imported,
            skipped = recorded.duplicates_skipped,
            "imported orders"
        );

        Ok(ImportReport {
            batch_id: recorded.id,
            rows_read: orders.len(),
            orders_imported: recorded.orders_imported as usize,
            duplicates_skipped: recorded.duplicates_skipped as usize,
        })
    }
}
