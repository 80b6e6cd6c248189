use std::sync::Arc;

use tracing::{debug, info, warn};
use wadesk_core::delivery::{DeliveryStatus, MessagePatch};
use wadesk_core::snapshot::SnapshotStore;
use wadesk_core::types::{Conversation, MediaType, Message};
use wadesk_core::CoreError;
use wadesk_identity::resolve;
use wadesk_media::{locate_media, MediaHydrator, PayloadShape};
use wadesk_preview::{extract_urls, EnsureOutcome, LinkPreviewCache};

use crate::content::normalize;
use crate::error::{ChatError, Result};
use crate::sender::OutboundSender;
use crate::types::{MediaView, SendReceipt};

/// Ties identity, media and preview resolution to the conversation
/// snapshots the console renders from.
pub struct ChatEngine {
    snapshots: Arc<dyn SnapshotStore>,
    hydrator: Arc<MediaHydrator>,
    previews: Option<Arc<LinkPreviewCache>>,
    sender: Option<Arc<dyn OutboundSender>>,
}

impl ChatEngine {
    pub fn new(snapshots: Arc<dyn SnapshotStore>, hydrator: Arc<MediaHydrator>) -> Self {
        Self {
            snapshots,
            hydrator,
            previews: None,
            sender: None,
        }
    }

    pub fn with_previews(mut self, previews: Arc<LinkPreviewCache>) -> Self {
        self.previews = Some(previews);
        self
    }

    pub fn with_sender(mut self, sender: Arc<dyn OutboundSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn hydrator(&self) -> &Arc<MediaHydrator> {
        &self.hydrator
    }

    /// Decide what to draw in a message's media slot.
    ///
    /// A message with nothing locatable gets a placeholder and a hydration
    /// request; the snapshot is patched once the media turns up.
    pub fn render_media(&self, conversation_id: &str, message: &Message) -> MediaView {
        let Some(media_type) = message.kind.media_type() else {
            return MediaView::NotMedia;
        };

        let located = message.media.clone().or_else(|| {
            message
                .raw
                .as_ref()
                .and_then(|raw| locate_media(raw, media_type))
        });
        if let Some(reference) = located {
            let src = reference.to_renderable(&mime_for(message, media_type));
            return MediaView::Ready { reference, src };
        }

        let outcome = self.hydrator.schedule(conversation_id, message, media_type);
        debug!(message_id = %message.id, ?outcome, "media placeholder rendered");
        MediaView::Placeholder
    }

    /// Message text as the console shows it.
    pub fn render_content(&self, message: &Message) -> String {
        normalize(&message.content, message.role)
    }

    /// Ask for a preview card for every link in the message.
    pub fn request_previews(&self, message: &Message) -> Vec<EnsureOutcome> {
        let Some(previews) = &self.previews else {
            return Vec::new();
        };
        extract_urls(&self.render_content(message))
            .iter()
            .map(|url| previews.ensure_preview(url))
            .collect()
    }

    /// Send an agent text to the conversation's contact.
    ///
    /// The destination is resolved first; an unresolvable conversation fails
    /// without any network call and without touching the snapshot.
    pub async fn send_text(&self, conversation_id: &str, text: &str) -> Result<SendReceipt> {
        let conversation = self.conversation(conversation_id)?;
        let Some(resolution) = resolve(&conversation) else {
            warn!(conversation_id, "send refused: no sendable phone number");
            return Err(ChatError::UnresolvableIdentity {
                conversation_id: conversation_id.to_string(),
            });
        };
        if text.trim().is_empty() {
            return Err(ChatError::SendFailed("message is empty".to_string()));
        }
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| ChatError::ConfigError("no outbound sender configured".to_string()))?;

        let pending = Message::outbound_text(text);
        let local_id = pending.id.clone();
        let mut next = conversation;
        next.messages.push(pending);
        self.snapshots.replace(next);
        debug!(
            conversation_id,
            message_id = %local_id,
            stage = ?resolution.stage,
            "outbound message pending"
        );

        match sender.send_text(&resolution.number, text).await {
            Ok(provider_id) => {
                let patch = MessagePatch::Ack {
                    message_id: local_id.clone(),
                    provider_id: provider_id.clone(),
                    status: DeliveryStatus::Sent,
                };
                let updated = self.snapshots.apply(conversation_id, &patch)?;
                info!(
                    conversation_id,
                    message_id = %local_id,
                    provider_id = provider_id.as_deref().unwrap_or("-"),
                    "message sent"
                );
                let message = message_in(&updated, &local_id)?;
                Ok(SendReceipt {
                    number: resolution.number.into_string(),
                    message,
                })
            }
            Err(e) => {
                warn!(conversation_id, message_id = %local_id, error = %e, "send failed");
                let patch = MessagePatch::Failed {
                    message_id: local_id,
                    reason: e.to_string(),
                };
                if let Err(patch_err) = self.snapshots.apply(conversation_id, &patch) {
                    warn!(conversation_id, error = %patch_err, "failed send could not be recorded");
                }
                Err(e)
            }
        }
    }

    /// Apply a delivery receipt addressed by provider message id.
    pub fn acknowledge(
        &self,
        conversation_id: &str,
        provider_id: &str,
        status: DeliveryStatus,
    ) -> Result<Conversation> {
        let patch = MessagePatch::Ack {
            message_id: provider_id.to_string(),
            provider_id: None,
            status,
        };
        let updated = self.snapshots.apply(conversation_id, &patch)?;
        debug!(conversation_id, provider_id, %status, "delivery receipt applied");
        Ok(updated)
    }

    fn conversation(&self, conversation_id: &str) -> Result<Conversation> {
        self.snapshots
            .current(conversation_id)
            .ok_or_else(|| {
                CoreError::ConversationNotFound {
                    id: conversation_id.to_string(),
                }
                .into()
            })
    }
}

/// The payload's own mimetype when it declares one.
fn mime_for(message: &Message, media_type: MediaType) -> String {
    message
        .raw
        .as_ref()
        .map(PayloadShape::detect)
        .and_then(|shape| shape.node().and_then(|n| n.mimetype.clone()))
        .unwrap_or_else(|| media_type.default_mime().to_string())
}

fn message_in(conversation: &Conversation, id: &str) -> Result<Message> {
    conversation.message(id).cloned().ok_or_else(|| {
        CoreError::MessageNotFound { id: id.to_string() }.into()
    })
}
