//! The snapshot-replace seam between the engine and the host application.
//!
//! The host owns conversation state. The engine reads the current snapshot
//! and hands back a whole, updated [`Conversation`]; it never mutates one in
//! place. Two patches racing on the same conversation resolve as
//! last-write-wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tracing::debug;

use crate::delivery::MessagePatch;
use crate::error::{CoreError, Result};
use crate::types::Conversation;

pub trait SnapshotStore: Send + Sync {
    /// Current snapshot of the conversation, if the host still has it.
    fn current(&self, conversation_id: &str) -> Option<Conversation>;

    /// Replace the whole snapshot. The host re-renders from this.
    fn replace(&self, conversation: Conversation);

    /// Read, patch and replace in one step.
    fn apply(&self, conversation_id: &str, patch: &MessagePatch) -> Result<Conversation> {
        let current =
            self.current(conversation_id)
                .ok_or_else(|| CoreError::ConversationNotFound {
                    id: conversation_id.to_string(),
                })?;
        let next = current.with_patch(patch)?;
        self.replace(next.clone());
        Ok(next)
    }
}

/// Process-local snapshot holder used by the CLI and tests.
#[derive(Default)]
pub struct InMemorySnapshots {
    conversations: RwLock<HashMap<String, Conversation>>,
    revision: AtomicU64,
}

impl InMemorySnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conversation: Conversation) {
        self.replace(conversation);
    }

    /// Bumped on every `replace`; lets callers tell when a re-render is due.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }
}

impl SnapshotStore for InMemorySnapshots {
    fn current(&self, conversation_id: &str) -> Option<Conversation> {
        self.conversations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(conversation_id)
            .cloned()
    }

    fn replace(&self, conversation: Conversation) {
        let rev = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(conversation_id = %conversation.id, rev, "snapshot replaced");
        self.conversations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(conversation.id.clone(), conversation);
    }
}
