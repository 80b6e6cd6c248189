use serde::Serialize;
use wadesk_core::types::{MediaReference, Message};

/// What the console should draw for a message's media slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "view")]
pub enum MediaView {
    /// Text message; no media slot.
    NotMedia,
    /// Media is known. `src` is directly loadable by a media element.
    Ready {
        reference: MediaReference,
        src: String,
    },
    /// Media is not known yet; hydration may fill it in.
    Placeholder,
}

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Number the message went to.
    pub number: String,
    /// The message as it now sits in the snapshot.
    pub message: Message,
}
