use std::fmt;

use serde::Serialize;
use wadesk_core::types::{MediaReference, MediaType};

/// Dedup key for hydration: one logical fetch per (media type, message).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FetchKey {
    pub media_type: MediaType,
    /// Provider message id.
    pub message_id: String,
}

impl FetchKey {
    pub fn new(media_type: MediaType, message_id: impl Into<String>) -> Self {
        Self {
            media_type,
            message_id: message_id.into(),
        }
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.media_type, self.message_id)
    }
}

/// Where a key is in its hydration lifecycle. No entry means idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPhase {
    Fetching,
    RetryWait,
    /// Resolved; the entry lingers, locked, for the success cooldown.
    Found,
    /// Attempt budget spent; scheduling is refused until reset.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchState {
    pub attempts: u32,
    pub locked: bool,
    pub phase: FetchPhase,
}

/// A blob persisted from an earlier webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub data_url: String,
    pub mime_type: Option<String>,
}

impl StoredBlob {
    pub fn is_usable(&self) -> bool {
        !self.data_url.trim().is_empty()
    }
}

/// Synchronous answer to a scheduling request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A fetch was started; `attempt` is the new attempt count.
    Started { attempt: u32 },
    /// A fetch for this key is running or cooling down after a failure.
    InFlight,
    /// Already resolved; holding off duplicate queries.
    AlreadyResolved,
    /// Attempt budget spent.
    Exhausted,
    /// The raw payload does not carry both provider ids.
    MissingKeys,
}

/// Notifications for the host, typically to trigger a re-render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrationEvent {
    Found {
        key: FetchKey,
        conversation_id: String,
        reference: MediaReference,
    },
    /// Lock released after a failed attempt; a render may reschedule.
    RetryReady { key: FetchKey, attempts: u32 },
    /// The hydrator is retrying on its own.
    Retrying { key: FetchKey, attempt: u32 },
    Exhausted { key: FetchKey, attempts: u32 },
}
