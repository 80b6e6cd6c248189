use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use crate::db::init_db;
use crate::error::Result;
use crate::locator::{inline_base64, message_keys};
use crate::types::StoredBlob;

/// Read side of the persisted-blob store consulted before any remote call.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn lookup(&self, namespace: &str, message_id: &str) -> Result<Option<StoredBlob>>;
}

/// SQLite-backed blob store fed by `messages.upsert` webhooks.
pub struct SqliteBlobStore {
    db: Mutex<Connection>,
}

impl SqliteBlobStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Upsert a blob. Later deliveries for the same message replace earlier ones.
    pub fn put(
        &self,
        namespace: &str,
        message_id: &str,
        data_url: &str,
        mime_type: Option<&str>,
        media_type: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO media_blobs (namespace, message_id, data_url, mime_type, media_type, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(namespace, message_id) DO UPDATE SET
                data_url = excluded.data_url,
                mime_type = excluded.mime_type,
                media_type = excluded.media_type,
                received_at = excluded.received_at",
            rusqlite::params![namespace, message_id, data_url, mime_type, media_type, now],
        )?;
        debug!(namespace, message_id, bytes = data_url.len(), "media blob stored");
        Ok(())
    }

    pub fn get(&self, namespace: &str, message_id: &str) -> Result<Option<StoredBlob>> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let blob = db
            .query_row(
                "SELECT data_url, mime_type FROM media_blobs
                 WHERE namespace = ?1 AND message_id = ?2",
                rusqlite::params![namespace, message_id],
                |row| {
                    Ok(StoredBlob {
                        data_url: row.get(0)?,
                        mime_type: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(blob)
    }

    /// Persist the inline base64 blob carried by a webhook payload.
    ///
    /// Returns `false` when the payload has no blob or no message id; such
    /// payloads are ignored rather than rejected.
    pub fn record_webhook(&self, namespace: &str, payload: &Value) -> Result<bool> {
        let (Some(keys), Some(blob)) = (message_keys(payload), inline_base64(payload)) else {
            return Ok(false);
        };
        self.put(
            namespace,
            &keys.message_id,
            &blob.data_url(),
            blob.mimetype.as_deref(),
            blob.media_type.map(|t| t.as_str()),
        )?;
        info!(namespace, message_id = %keys.message_id, "webhook media persisted");
        Ok(true)
    }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    async fn lookup(&self, namespace: &str, message_id: &str) -> Result<Option<StoredBlob>> {
        self.get(namespace, message_id)
    }
}
