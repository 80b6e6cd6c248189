//! Finding a media reference inside a raw provider payload.
//!
//! Payload shapes drift between provider versions, so lookup happens in two
//! layers: a typed probe of the handful of places media is known to live,
//! then a bounded structural walk over whatever else the payload contains.
//! Both layers are pure and never fail; a malformed payload is simply
//! "not found".

use std::collections::HashSet;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;
use wadesk_core::types::{MediaReference, MediaType};

/// Deepest nesting level the structural walk will enter (root = 0).
pub const MAX_DEPTH: usize = 5;
/// Hard cap on nodes visited by one walk.
pub const MAX_NODES: usize = 4096;

/// Fields that carry a media pointer directly.
const DIRECT_FIELDS: &[&str] = &["url", "mediaUrl", "directPath"];

/// Containers searched before any other property during the walk.
const PRIORITY_KEYS: &[&str] = &[
    "imageMessage",
    "videoMessage",
    "audioMessage",
    "documentMessage",
    "stickerMessage",
    "message",
    "media",
];

/// Provider-wide fallbacks probed after the typed container, relative to
/// the payload root or its `data` wrapper.
const GENERIC_PATHS: &[&[&str]] = &[
    &["message", "url"],
    &["message", "mediaUrl"],
    &["url"],
    &["mediaUrl"],
];

/// The media fields of a `<kind>Message` container.
///
/// Non-string values decode as absent rather than failing the node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaNode {
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub media_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub direct_path: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mimetype: Option<String>,
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

impl MediaNode {
    /// Decode the container for `media_type` under `root.message`.
    pub fn at(root: &Value, media_type: MediaType) -> Option<MediaNode> {
        let message = root.get("message")?;
        let node = message.get(media_type.container_key()).or_else(|| {
            // Captioned documents are wrapped one level deeper.
            (media_type == MediaType::Document)
                .then(|| {
                    message
                        .get("documentWithCaptionMessage")?
                        .get("message")?
                        .get("documentMessage")
                })
                .flatten()
        })?;
        if !node.is_object() {
            return None;
        }
        MediaNode::deserialize(node).ok()
    }

    /// First usable pointer in `url`, `mediaUrl`, `directPath` order.
    pub fn reference(&self) -> Option<MediaReference> {
        [&self.url, &self.media_url, &self.direct_path]
            .into_iter()
            .flatten()
            .find_map(|s| MediaReference::new(s.as_str()))
    }
}

/// A payload classified by the media container it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadShape {
    Image(MediaNode),
    Video(MediaNode),
    Audio(MediaNode),
    Document(MediaNode),
    Sticker(MediaNode),
    Unknown,
}

impl PayloadShape {
    pub fn detect(raw: &Value) -> PayloadShape {
        for root in roots(raw) {
            for media_type in MediaType::ALL {
                if let Some(node) = MediaNode::at(root, media_type) {
                    return PayloadShape::from_node(media_type, node);
                }
            }
        }
        PayloadShape::Unknown
    }

    fn from_node(media_type: MediaType, node: MediaNode) -> PayloadShape {
        match media_type {
            MediaType::Image => PayloadShape::Image(node),
            MediaType::Video => PayloadShape::Video(node),
            MediaType::Audio => PayloadShape::Audio(node),
            MediaType::Document => PayloadShape::Document(node),
            MediaType::Sticker => PayloadShape::Sticker(node),
        }
    }

    pub fn media_type(&self) -> Option<MediaType> {
        match self {
            PayloadShape::Image(_) => Some(MediaType::Image),
            PayloadShape::Video(_) => Some(MediaType::Video),
            PayloadShape::Audio(_) => Some(MediaType::Audio),
            PayloadShape::Document(_) => Some(MediaType::Document),
            PayloadShape::Sticker(_) => Some(MediaType::Sticker),
            PayloadShape::Unknown => None,
        }
    }

    pub fn node(&self) -> Option<&MediaNode> {
        match self {
            PayloadShape::Image(n)
            | PayloadShape::Video(n)
            | PayloadShape::Audio(n)
            | PayloadShape::Document(n)
            | PayloadShape::Sticker(n) => Some(n),
            PayloadShape::Unknown => None,
        }
    }
}

/// The payload itself, then its `data` wrapper if present.
fn roots(raw: &Value) -> impl Iterator<Item = &Value> {
    std::iter::once(raw).chain(raw.get("data").filter(|d| d.is_object()))
}

fn string_at(root: &Value, path: &[&str]) -> Option<MediaReference> {
    let mut cur = root;
    for seg in path {
        cur = cur.get(*seg)?;
    }
    cur.as_str().and_then(MediaReference::new)
}

/// Locate a media reference for `media_type` in `raw`.
///
/// Well-known locations are probed first (typed container, then generic
/// fields, at the root and under `data`); if none match, a depth- and
/// node-bounded walk searches the whole payload.
pub fn locate_media(raw: &Value, media_type: MediaType) -> Option<MediaReference> {
    if let Some(found) = probe_well_known(raw, media_type) {
        return Some(found);
    }
    let found = walk_payload(raw);
    if found.is_none() {
        debug!(%media_type, "no media reference in payload");
    }
    found
}

/// Locate media without knowing the declared type.
///
/// Known shapes go through the typed probe for their own media type;
/// unknown shapes use the structural walk alone.
pub fn locate_any(raw: &Value) -> Option<(Option<MediaType>, MediaReference)> {
    match PayloadShape::detect(raw).media_type() {
        Some(media_type) => locate_media(raw, media_type).map(|r| (Some(media_type), r)),
        None => walk_payload(raw).map(|r| (None, r)),
    }
}

fn probe_well_known(raw: &Value, media_type: MediaType) -> Option<MediaReference> {
    for root in roots(raw) {
        if let Some(found) = MediaNode::at(root, media_type).and_then(|n| n.reference()) {
            return Some(found);
        }
        for path in GENERIC_PATHS {
            if let Some(found) = string_at(root, path) {
                return Some(found);
            }
        }
    }
    None
}

/// Bounded depth-first search for any direct media field.
pub fn walk_payload(raw: &Value) -> Option<MediaReference> {
    let mut seen = HashSet::new();
    walk(raw, 0, &mut seen)
}

fn is_container(v: &Value) -> bool {
    v.is_object() || v.is_array()
}

fn walk(node: &Value, depth: usize, seen: &mut HashSet<*const Value>) -> Option<MediaReference> {
    if depth > MAX_DEPTH || seen.len() >= MAX_NODES {
        return None;
    }
    if !seen.insert(node as *const Value) {
        return None;
    }

    match node {
        Value::Object(map) => {
            for field in DIRECT_FIELDS {
                if let Some(found) = map.get(*field).and_then(Value::as_str).and_then(MediaReference::new) {
                    return Some(found);
                }
            }
            for key in PRIORITY_KEYS {
                if let Some(child) = map.get(*key).filter(|c| is_container(c)) {
                    if let Some(found) = walk(child, depth + 1, seen) {
                        return Some(found);
                    }
                }
            }
            for (key, child) in map {
                if PRIORITY_KEYS.contains(&key.as_str()) || !is_container(child) {
                    continue;
                }
                if let Some(found) = walk(child, depth + 1, seen) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items
            .iter()
            .filter(|c| is_container(c))
            .find_map(|child| walk(child, depth + 1, seen)),
        _ => None,
    }
}

/// Provider ids needed to ask the gateway about a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageKeys {
    pub message_id: String,
    pub remote_jid: String,
}

/// Extract the provider message id and remote conversation id.
///
/// Looks at `key`, `data.key` and `message.key`, then flat `messageId` /
/// `keyId` / `remoteJid` fields. Both ids must be found.
pub fn message_keys(raw: &Value) -> Option<MessageKeys> {
    let candidates = [Some(raw), raw.get("data"), raw.get("message")];
    let mut message_id = None;
    let mut remote_jid = None;

    for root in candidates.into_iter().flatten() {
        let key = root.get("key");
        if message_id.is_none() {
            message_id = [
                key.and_then(|k| k.get("id")),
                root.get("messageId"),
                root.get("keyId"),
            ]
            .into_iter()
            .flatten()
            .find_map(non_empty_str);
        }
        if remote_jid.is_none() {
            remote_jid = [key.and_then(|k| k.get("remoteJid")), root.get("remoteJid")]
                .into_iter()
                .flatten()
                .find_map(non_empty_str);
        }
    }

    Some(MessageKeys {
        message_id: message_id?,
        remote_jid: remote_jid?,
    })
}

fn non_empty_str(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A base64 blob delivered inline by a webhook (`message.base64`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineBlob {
    pub base64: String,
    pub mimetype: Option<String>,
    pub media_type: Option<MediaType>,
}

impl InlineBlob {
    pub fn data_url(&self) -> String {
        let mime = self
            .mimetype
            .as_deref()
            .or_else(|| self.media_type.map(MediaType::default_mime))
            .unwrap_or("application/octet-stream");
        format!("data:{mime};base64,{}", self.base64)
    }
}

pub fn inline_base64(raw: &Value) -> Option<InlineBlob> {
    for root in roots(raw) {
        let Some(b64) = root
            .get("message")
            .and_then(|m| m.get("base64"))
            .and_then(non_empty_str)
        else {
            continue;
        };
        let shape = PayloadShape::detect(root);
        return Some(InlineBlob {
            base64: b64,
            mimetype: shape.node().and_then(|n| n.mimetype.clone()),
            media_type: shape.media_type(),
        });
    }
    None
}
