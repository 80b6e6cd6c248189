use rusqlite::{Connection, Result};

/// Initialise media tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_media_blobs_table(conn)
}

/// Blobs delivered inline by webhooks, keyed by provider message id.
/// `namespace` is the gateway instance the webhook came from.
fn create_media_blobs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS media_blobs (
            namespace   TEXT NOT NULL,
            message_id  TEXT NOT NULL,
            data_url    TEXT NOT NULL,
            mime_type   TEXT,
            media_type  TEXT,
            received_at TEXT NOT NULL,
            PRIMARY KEY (namespace, message_id)
        );
        CREATE INDEX IF NOT EXISTS idx_media_blobs_received
            ON media_blobs(received_at DESC);",
    )
}
