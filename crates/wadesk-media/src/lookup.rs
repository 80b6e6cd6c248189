use async_trait::async_trait;
use wadesk_core::config::EvolutionConfig;
use wadesk_core::types::MediaType;

use crate::error::Result;

/// Remote lookup of a message's media by provider id.
///
/// Implementations return any URL (or data URI) the gateway can produce for
/// the message, `Ok(None)` when the gateway has nothing yet.
#[async_trait]
pub trait RemoteMediaLookup: Send + Sync {
    async fn find_media(
        &self,
        api: &EvolutionConfig,
        message_id: &str,
        remote_jid: &str,
        media_type: MediaType,
    ) -> Result<Option<String>>;
}
