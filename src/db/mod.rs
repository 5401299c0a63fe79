use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use serde::Serialize;
use thiserror::Error;

use self::models::{ExternalOrder, ImportBatch, NewImportBatch, NewOrder, SyncState};

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("json serialization: {0}")]
    Json(#[from] serde_json::Error),

    #[error("filesystem: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Config(String),
}

pub mod migrations;
pub mod models;
pub mod schema;

#[derive(Debug, Clone, Serialize)]
pub struct ChannelOrderCount {
    pub channel_id: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_orders: i64,
    pub total_batches: i64,
    pub orders_by_channel: Vec<ChannelOrderCount>,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        let mut db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&mut self) -> Result<(), DbError> {
        migrations::migrate(&mut self.conn)
            .map_err(|e| DbError::Config(format!("migration failed: {e:#}")))
    }

    pub fn default_db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir()
            .ok_or_else(|| DbError::Config("failed to determine home directory".to_string()))?;
        Ok(home.join(".ordermail").join("ordermail.db"))
    }

    /// Writes one batch and its orders atomically. Orders whose external
    /// reference already exists are skipped and counted as duplicates.
    pub fn import_orders(
        &self,
        batch: &NewImportBatch,
        orders: &[NewOrder],
    ) -> Result<ImportBatch, DbError> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO import_batches (
                source_message_id, channel_id, synch_type, source_file, message_date, rows_read
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                batch.source_message_id,
                batch.channel_id,
                batch.synch_type,
                batch.source_file,
                batch.message_date,
                batch.rows_read,
            ],
        )?;
        let batch_id = tx.last_insert_rowid();

        let mut imported = 0i64;
        let mut skipped = 0i64;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO orders (external_ref, channel_id, order_number, batch_id, payload)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )?;
            for order in orders {
                let payload = serde_json::to_string(&order.payload)?;
                let inserted = stmt.execute(params![
                    order.external_ref,
                    batch.channel_id,
                    order.order_number,
                    batch_id,
                    payload,
                ])?;
                if inserted == 0 {
                    skipped += 1;
                } else {
                    imported += 1;
                }
            }
        }

        tx.execute(
            "UPDATE import_batches SET orders_imported = ?, duplicates_skipped = ? WHERE id = ?",
            params![imported, skipped, batch_id],
        )?;
        tx.commit()?;

        self.get_import_batch(batch_id)?
            .ok_or_else(|| DbError::Config(format!("import batch {batch_id} vanished after commit")))
    }

    pub fn get_import_batch(&self, id: i64) -> Result<Option<ImportBatch>, DbError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, source_message_id, channel_id, synch_type, source_file, message_date,
                   rows_read, orders_imported, duplicates_skipped, imported_at
            FROM import_batches
            WHERE id = ?
            "#,
        )?;

        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(ImportBatch::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn get_order(&self, external_ref: &str) -> Result<Option<ExternalOrder>, DbError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT external_ref, channel_id, order_number, batch_id, payload, imported_at
            FROM orders
            WHERE external_ref = ?
            "#,
        )?;

        let mut rows = stmt.query([external_ref])?;
        if let Some(row) = rows.next()? {
            Ok(Some(ExternalOrder::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_orders(
        &self,
        channel_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ExternalOrder>, DbError> {
        let limit: i64 = if limit == 0 { 50 } else { limit as i64 };
        let mut stmt = self.conn.prepare(
            r#"
            SELECT external_ref, channel_id, order_number, batch_id, payload, imported_at
            FROM orders
            WHERE (?1 IS NULL OR channel_id = ?1)
            ORDER BY imported_at DESC, external_ref ASC
            LIMIT ?2
            "#,
        )?;

        let orders = stmt
            .query_map(params![channel_id, limit], ExternalOrder::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }

    pub fn get_sync_state(&self, key: &str) -> Result<Option<SyncState>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value, updated_at FROM sync_state WHERE key = ? LIMIT 1")?;
        let mut rows = stmt.query([key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(SyncState::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn set_sync_state(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.conn.execute(
            r#"
            INSERT INTO sync_state (key, value, updated_at)
            VALUES (?, ?, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    pub fn clear_sync_state(&self, key: &str) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM sync_state WHERE key = ?", [key])?;
        Ok(())
    }

    pub fn get_stats(&self) -> Result<DatabaseStats, DbError> {
        let total_orders: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;
        let total_batches: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM import_batches", [], |row| row.get(0))?;

        let mut stmt = self.conn.prepare(
            "SELECT channel_id, COUNT(*) AS count FROM orders GROUP BY channel_id ORDER BY count DESC",
        )?;
        let orders_by_channel = stmt
            .query_map([], |row| {
                Ok(ChannelOrderCount {
                    channel_id: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(DatabaseStats {
            total_orders,
            total_batches,
            orders_by_channel,
        })
    }
}
