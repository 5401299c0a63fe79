use anyhow::Result;
use rusqlite::Connection;

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS import_batches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_message_id TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            synch_type TEXT NOT NULL,
            source_file TEXT NOT NULL,
            message_date TEXT,
            rows_read INTEGER NOT NULL DEFAULT 0,
            orders_imported INTEGER NOT NULL DEFAULT 0,
            duplicates_skipped INTEGER NOT NULL DEFAULT 0,
            imported_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS orders (
            external_ref TEXT PRIMARY KEY,
            channel_id TEXT NOT NULL,
            order_number TEXT NOT NULL,
            batch_id INTEGER REFERENCES import_batches(id),
            payload TEXT NOT NULL,
            imported_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS sync_state (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_orders_channel_id ON orders(channel_id);
        CREATE INDEX IF NOT EXISTS idx_orders_batch_id ON orders(batch_id);
        CREATE INDEX IF NOT EXISTS idx_import_batches_message ON import_batches(source_message_id);
        "#,
    )?;

    Ok(())
}
