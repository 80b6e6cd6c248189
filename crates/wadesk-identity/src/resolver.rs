use std::fmt;

use serde::Serialize;
use tracing::debug;
use wadesk_core::types::Conversation;

use crate::address::{digits, is_bare_numeric, is_group, is_list, is_synthetic};

/// Shortest digit string accepted as a sendable number.
pub const MIN_DIGITS: usize = 10;
/// Longest digit string accepted; anything longer is a list/device id.
pub const MAX_DIGITS: usize = 14;

/// A digits-only phone number with length in `MIN_DIGITS..=MAX_DIGITS`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// `None` unless `digits` is all ASCII digits and inside the window.
    pub fn new(digits: &str) -> Option<Self> {
        if in_window(digits) && digits.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(digits.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which source produced the resolved number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ConversationAddress,
    MessageAuthor,
    ContactNumber,
    BareConversationId,
    ContactFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub number: PhoneNumber,
    pub stage: Stage,
}

fn in_window(d: &str) -> bool {
    (MIN_DIGITS..=MAX_DIGITS).contains(&d.len())
}

/// Derive the number an outbound send should target.
///
/// Sources are tried in priority order: the conversation address, message
/// authors (newest first, preferring longer numbers), the stored contact
/// number, a bare numeric conversation id, and finally the contact number
/// again as a last resort. `None` means the conversation is unsendable and
/// the caller must not attempt any network call.
pub fn resolve(conversation: &Conversation) -> Option<Resolution> {
    let id = conversation.id.trim();

    if let Some(number) = from_conversation_address(id) {
        debug!(conversation_id = %id, %number, "phone resolved from conversation address");
        return Some(Resolution {
            number,
            stage: Stage::ConversationAddress,
        });
    }

    let mut best: Option<(String, Stage)> = None;

    for msg in conversation.messages.iter().rev() {
        let Some(author) = msg.author.as_deref() else {
            continue;
        };
        if is_group(author) || is_list(author) {
            continue;
        }
        let d = digits(author);
        let best_len = best.as_ref().map_or(0, |(b, _)| b.len());
        if in_window(&d) && d.len() > best_len {
            best = Some((d, Stage::MessageAuthor));
        }
    }

    let contact = conversation
        .contact_number
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    if let Some(c) = contact {
        if is_bare_numeric(c) && !is_synthetic(c) {
            let d = digits(c);
            let best_len = best.as_ref().map_or(0, |(b, _)| b.len());
            if d.len() >= MIN_DIGITS && d.len() > best_len {
                best = Some((d, Stage::ContactNumber));
            }
        }
    }

    if best.is_none()
        && !id.contains('@')
        && is_bare_numeric(id)
        && !is_group(id)
        && !is_list(id)
        && !is_synthetic(id)
    {
        let d = digits(id);
        if in_window(&d) {
            best = Some((d, Stage::BareConversationId));
        }
    }

    if best.is_none() {
        if let Some(c) = contact {
            if is_bare_numeric(c) && !is_synthetic(c) {
                let d = digits(c);
                if d.len() >= MIN_DIGITS {
                    best = Some((d, Stage::ContactFallback));
                }
            }
        }
    }

    match best {
        Some((d, stage)) => match PhoneNumber::new(&d) {
            Some(number) => {
                debug!(conversation_id = %id, %number, ?stage, "phone resolved");
                Some(Resolution { number, stage })
            }
            None => {
                debug!(
                    conversation_id = %id,
                    digits = d.len(),
                    ?stage,
                    "candidate outside digit window; unsendable"
                );
                None
            }
        },
        None => {
            debug!(conversation_id = %id, "no phone candidate; unsendable");
            None
        }
    }
}

/// String form of [`resolve`]: digits, or `""` when unsendable.
pub fn resolve_phone_number(conversation: &Conversation) -> String {
    resolve(conversation)
        .map(|r| r.number.into_string())
        .unwrap_or_default()
}

fn from_conversation_address(id: &str) -> Option<PhoneNumber> {
    if !id.contains('@') || is_group(id) || is_list(id) || is_synthetic(id) {
        return None;
    }
    let d = digits(id);
    if d.len() > MAX_DIGITS {
        debug!(conversation_id = %id, digits = d.len(), "address too long for a phone; treating as list id");
        return None;
    }
    PhoneNumber::new(&d)
}
