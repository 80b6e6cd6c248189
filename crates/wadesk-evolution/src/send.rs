//! Outbound text through `message/sendText`.
//!
//! WhatsApp has no hard text limit, but very long bodies are split at
//! 4000 characters, preferring line breaks.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};
use wadesk_chat::{ChatError, OutboundSender};
use wadesk_identity::PhoneNumber;

use crate::client::EvolutionClient;
use crate::error::EvolutionError;

const SEND_ROUTE: &str = "message/sendText";

/// Maximum characters per outbound message.
const CHUNK_MAX: usize = 4000;

/// Split `text` into chunks of at most [`CHUNK_MAX`] characters.
///
/// Lines are kept whole when they fit; a single over-long line is cut on
/// character boundaries.
pub fn split_chunks(text: &str) -> Vec<String> {
    if text.chars().count() <= CHUNK_MAX {
        return vec![text.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let cost = if current.is_empty() { line_len } else { 1 + line_len };

        if !current.is_empty() && current_len + cost > CHUNK_MAX {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > CHUNK_MAX {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(CHUNK_MAX) {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                current = piece.iter().collect();
                current_len = piece.len();
            }
            continue;
        }

        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Provider id the gateway assigned to the sent message (`key.id`).
pub fn parse_send_response(body: &Value) -> Option<String> {
    body.pointer("/key/id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

impl EvolutionClient {
    /// Send `text` to `number`. Returns the provider id of the first chunk.
    pub async fn send_text_chunks(
        &self,
        number: &PhoneNumber,
        text: &str,
    ) -> Result<Option<String>, EvolutionError> {
        let mut first_id = None;
        let chunks = split_chunks(text);
        for (i, chunk) in chunks.iter().enumerate() {
            let body = json!({
                "number": number.as_str(),
                "text": chunk,
            });
            let resp = self.post(self.config(), SEND_ROUTE, &body).await?;
            let id = parse_send_response(&resp);
            debug!(%number, chunk = i, provider_id = id.as_deref().unwrap_or("-"), "sendText ok");
            if first_id.is_none() {
                first_id = id;
            }
        }
        info!(%number, chunks = chunks.len(), "message delivered to gateway");
        Ok(first_id)
    }
}

#[async_trait]
impl OutboundSender for EvolutionClient {
    async fn send_text(&self, number: &PhoneNumber, text: &str) -> Result<Option<String>, ChatError> {
        Ok(self.send_text_chunks(number, text).await?)
    }
}
