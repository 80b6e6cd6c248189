use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::delivery::DeliveryStatus;

/// CDN host that serves WhatsApp `directPath` fragments.
pub const WHATSAPP_CDN: &str = "https://mmg.whatsapp.net";

/// Declared message type as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

impl MessageKind {
    /// `None` for text; every other kind carries media.
    pub fn media_type(self) -> Option<MediaType> {
        match self {
            MessageKind::Text => None,
            MessageKind::Image => Some(MediaType::Image),
            MessageKind::Video => Some(MediaType::Video),
            MessageKind::Audio => Some(MediaType::Audio),
            MessageKind::Document => Some(MediaType::Document),
            MessageKind::Sticker => Some(MediaType::Sticker),
        }
    }
}

/// The non-text subset of [`MessageKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

impl MediaType {
    pub const ALL: [MediaType; 5] = [
        MediaType::Image,
        MediaType::Video,
        MediaType::Audio,
        MediaType::Document,
        MediaType::Sticker,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Document => "document",
            MediaType::Sticker => "sticker",
        }
    }

    /// Property name of this media type's container inside a provider
    /// `message` object, e.g. `imageMessage`.
    pub fn container_key(self) -> &'static str {
        match self {
            MediaType::Image => "imageMessage",
            MediaType::Video => "videoMessage",
            MediaType::Audio => "audioMessage",
            MediaType::Document => "documentMessage",
            MediaType::Sticker => "stickerMessage",
        }
    }

    /// Mimetype assumed when a blob arrives without one.
    pub fn default_mime(self) -> &'static str {
        match self {
            MediaType::Image => "image/jpeg",
            MediaType::Video => "video/mp4",
            MediaType::Audio => "audio/ogg",
            MediaType::Document => "application/octet-stream",
            MediaType::Sticker => "image/webp",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "image" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            "audio" | "ptt" => Ok(MediaType::Audio),
            "document" => Ok(MediaType::Document),
            "sticker" => Ok(MediaType::Sticker),
            other => Err(format!("unknown media type: {other}")),
        }
    }
}

/// Shape of a [`MediaReference`] string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaRefKind {
    Url,
    CdnPath,
    Base64,
    DataUri,
}

/// A media pointer exactly as the provider handed it over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaReference(String);

impl MediaReference {
    /// Returns `None` for blank input.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> MediaRefKind {
        let s = self.0.as_str();
        let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
        if lower.starts_with("data:") {
            MediaRefKind::DataUri
        } else if lower.starts_with("http://") || lower.starts_with("https://") {
            MediaRefKind::Url
        } else if s.starts_with('/') || !looks_like_base64(s) {
            MediaRefKind::CdnPath
        } else {
            MediaRefKind::Base64
        }
    }

    /// Something a media element can load directly.
    ///
    /// Bare base64 is wrapped into a data URI with `mime`; CDN fragments are
    /// joined onto the WhatsApp CDN host.
    pub fn to_renderable(&self, mime: &str) -> String {
        match self.kind() {
            MediaRefKind::Url | MediaRefKind::DataUri => self.0.clone(),
            MediaRefKind::Base64 => format!("data:{mime};base64,{}", self.0),
            MediaRefKind::CdnPath => {
                if self.0.starts_with('/') {
                    format!("{WHATSAPP_CDN}{}", self.0)
                } else {
                    format!("{WHATSAPP_CDN}/{}", self.0)
                }
            }
        }
    }
}

impl fmt::Display for MediaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn looks_like_base64(s: &str) -> bool {
    s.len() >= 16
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'\n' | b'\r'))
        && !s.contains("//")
}

/// Who wrote a message, from the console's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorRole {
    #[default]
    Customer,
    /// Outbound messages typed by a support agent.
    Agent,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Assigned by the provider on acknowledgment; immutable afterwards.
    #[serde(default)]
    pub provider_id: Option<String>,
    /// Raw provider author identifier (e.g. `5511...@s.whatsapp.net`).
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub role: AuthorRole,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub media: Option<MediaReference>,
    #[serde(default)]
    pub raw: Option<serde_json::Value>,
    #[serde(default)]
    pub delivery: DeliveryStatus,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// A fresh agent-authored text message awaiting provider acknowledgment.
    pub fn outbound_text(content: &str) -> Self {
        Self {
            // UUIDv7 keeps local ids time-sortable alongside provider ids.
            id: format!("local-{}", Uuid::now_v7()),
            role: AuthorRole::Agent,
            content: content.to_string(),
            kind: MessageKind::Text,
            delivery: DeliveryStatus::Pending,
            timestamp: Utc::now(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Open,
    Pending,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub status: ConversationStatus,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }
}
