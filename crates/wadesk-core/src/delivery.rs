//! Message delivery state machine and the patches applied to conversation
//! snapshots.
//!
//! Every change the engine proposes (hydrated media, send acknowledgment,
//! send failure) is a [`MessagePatch`]. Patches target one message by id and
//! go through [`DeliveryStatus::advance`], so a late or duplicated provider
//! receipt can never move a message backwards.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::types::{Conversation, MediaReference};

/// `pending → sent → delivered → read`, with `error` reachable from
/// `pending` and `sent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Sent,
    Delivered,
    Read,
    Error,
}

impl DeliveryStatus {
    fn rank(self) -> u8 {
        match self {
            DeliveryStatus::Pending => 0,
            DeliveryStatus::Sent => 1,
            DeliveryStatus::Delivered => 2,
            DeliveryStatus::Read => 3,
            DeliveryStatus::Error => u8::MAX,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Read | DeliveryStatus::Error)
    }

    /// Whether `self → next` is a legal move.
    ///
    /// Forward jumps are allowed (a `read` receipt may arrive before
    /// `delivered`); re-applying the current status is a no-op.
    pub fn can_advance(self, next: DeliveryStatus) -> bool {
        if self == next {
            return true;
        }
        match next {
            DeliveryStatus::Error => {
                matches!(self, DeliveryStatus::Pending | DeliveryStatus::Sent)
            }
            _ => self != DeliveryStatus::Error && next.rank() > self.rank(),
        }
    }

    pub fn advance(self, next: DeliveryStatus) -> Result<DeliveryStatus> {
        if self.can_advance(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Map Evolution/Baileys receipt names (`SERVER_ACK`, `DELIVERY_ACK`,
    /// `READ`, `PLAYED`, ...) onto the state machine.
    pub fn from_provider(status: &str) -> Option<DeliveryStatus> {
        match status.to_ascii_uppercase().as_str() {
            "PENDING" => Some(DeliveryStatus::Pending),
            "SERVER_ACK" | "SENT" => Some(DeliveryStatus::Sent),
            "DELIVERY_ACK" | "DELIVERED" => Some(DeliveryStatus::Delivered),
            "READ" | "PLAYED" => Some(DeliveryStatus::Read),
            "ERROR" | "FAILED" => Some(DeliveryStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Read => write!(f, "read"),
            DeliveryStatus::Error => write!(f, "error"),
        }
    }
}

/// A single targeted change to one message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePatch {
    /// Hydrated media reference.
    Media {
        message_id: String,
        reference: MediaReference,
    },
    /// Provider acknowledgment or receipt.
    ///
    /// `message_id` may be the local id (send response) or the provider id
    /// (later receipts).
    Ack {
        message_id: String,
        provider_id: Option<String>,
        status: DeliveryStatus,
    },
    /// The send call failed before or at the provider.
    Failed { message_id: String, reason: String },
}

impl MessagePatch {
    pub fn message_id(&self) -> &str {
        match self {
            MessagePatch::Media { message_id, .. }
            | MessagePatch::Ack { message_id, .. }
            | MessagePatch::Failed { message_id, .. } => message_id,
        }
    }
}

impl Conversation {
    /// Return a copy of this snapshot with `patch` applied.
    ///
    /// The original is left untouched; on error no partial change escapes.
    pub fn with_patch(&self, patch: &MessagePatch) -> Result<Conversation> {
        let mut next = self.clone();
        let target = patch.message_id();
        let msg = next
            .messages
            .iter_mut()
            .find(|m| m.id == target || m.provider_id.as_deref() == Some(target))
            .ok_or_else(|| CoreError::MessageNotFound {
                id: target.to_string(),
            })?;

        match patch {
            MessagePatch::Media { reference, .. } => {
                msg.media = Some(reference.clone());
            }
            MessagePatch::Ack {
                provider_id,
                status,
                ..
            } => {
                if let Some(pid) = provider_id {
                    match &msg.provider_id {
                        Some(existing) if existing != pid => {
                            return Err(CoreError::ProviderIdReassigned {
                                message_id: msg.id.clone(),
                                existing: existing.clone(),
                            });
                        }
                        Some(_) => {}
                        None => msg.provider_id = Some(pid.clone()),
                    }
                }
                msg.delivery = msg.delivery.advance(*status)?;
            }
            MessagePatch::Failed { .. } => {
                msg.delivery = msg.delivery.advance(DeliveryStatus::Error)?;
            }
        }

        Ok(next)
    }
}
