//! Asynchronous media hydration for messages whose payload carries no
//! usable media reference.
//!
//! The provider's webhook may persist a blob some time after the message
//! event, so a miss is not final. Each `(media type, message id)` key runs
//! through a small state machine:
//!
//! ```text
//! idle ──schedule──▶ fetching ──hit──▶ found ──60s──▶ idle (entry evicted)
//!                       │
//!                      miss
//!                       ▼
//!                   retry-wait ──4s──▶ fetching (auto retry) / idle-but-counted
//!                       │
//!                 attempts == max
//!                       ▼
//!                   exhausted (refused until reset)
//! ```
//!
//! The per-key map is the only shared mutable state. Check-and-set happens
//! through the map's entry API, so two renders racing on the same key can
//! never start two fetches.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wadesk_core::config::{EvolutionConfig, MediaConfig};
use wadesk_core::delivery::MessagePatch;
use wadesk_core::snapshot::SnapshotStore;
use wadesk_core::types::{MediaReference, MediaType, Message};

use crate::blob::BlobStore;
use crate::locator::{message_keys, MessageKeys};
use crate::lookup::RemoteMediaLookup;
use crate::types::{FetchKey, FetchPhase, FetchState, HydrationEvent, ScheduleOutcome};

#[derive(Debug, Clone)]
pub struct HydratorConfig {
    pub max_attempts: u32,
    pub retry_cooldown: Duration,
    pub success_cooldown: Duration,
    pub auto_retry: bool,
    /// Blob-store namespace (the gateway instance name).
    pub namespace: String,
}

impl HydratorConfig {
    pub fn from_config(media: &MediaConfig, namespace: &str) -> Self {
        Self {
            max_attempts: media.max_attempts,
            retry_cooldown: Duration::from_secs(media.retry_cooldown_secs),
            success_cooldown: Duration::from_secs(media.success_cooldown_secs),
            auto_retry: media.auto_retry,
            namespace: namespace.to_string(),
        }
    }
}

impl Default for HydratorConfig {
    fn default() -> Self {
        Self::from_config(&MediaConfig::default(), wadesk_core::config::DEFAULT_INSTANCE)
    }
}

/// Everything one hydration run needs, captured at schedule time.
#[derive(Debug, Clone)]
struct Job {
    key: FetchKey,
    keys: MessageKeys,
    conversation_id: String,
    local_message_id: String,
}

pub struct MediaHydrator {
    states: DashMap<FetchKey, FetchState>,
    blobs: Arc<dyn BlobStore>,
    remote: Option<Arc<dyn RemoteMediaLookup>>,
    api: EvolutionConfig,
    snapshots: Arc<dyn SnapshotStore>,
    events: Option<mpsc::UnboundedSender<HydrationEvent>>,
    config: HydratorConfig,
}

impl MediaHydrator {
    pub fn new(
        config: HydratorConfig,
        blobs: Arc<dyn BlobStore>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            states: DashMap::new(),
            blobs,
            remote: None,
            api: EvolutionConfig::default(),
            snapshots,
            events: None,
            config,
        }
    }

    /// Enable the remote lookup step. It only runs while `api` has both a
    /// base URL and an API key.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteMediaLookup>, api: EvolutionConfig) -> Self {
        self.remote = Some(remote);
        self.api = api;
        self
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<HydrationEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn config(&self) -> &HydratorConfig {
        &self.config
    }

    /// Current state of a key, `None` when idle.
    pub fn state(&self, key: &FetchKey) -> Option<FetchState> {
        self.states.get(key).map(|s| *s)
    }

    /// Forget a key so it can be scheduled again (manual re-trigger).
    ///
    /// Refuses while a fetch is in flight.
    pub fn reset(&self, key: &FetchKey) -> bool {
        let removed = self
            .states
            .remove_if(key, |_, s| !s.locked)
            .is_some();
        if removed {
            info!(%key, "hydration state reset");
        }
        removed
    }

    /// Schedule hydration for `message` in `conversation_id`.
    ///
    /// Returns immediately; the lookup runs on the tokio runtime and, on
    /// success, patches the conversation through the snapshot store.
    pub fn schedule(
        self: &Arc<Self>,
        conversation_id: &str,
        message: &Message,
        media_type: MediaType,
    ) -> ScheduleOutcome {
        let Some(keys) = message.raw.as_ref().and_then(message_keys) else {
            debug!(message_id = %message.id, "hydration skipped: payload lacks provider ids");
            return ScheduleOutcome::MissingKeys;
        };

        let key = FetchKey::new(media_type, keys.message_id.clone());
        let attempt = match self.try_acquire(&key) {
            Ok(n) => n,
            Err(outcome) => {
                debug!(%key, ?outcome, "hydration not started");
                return outcome;
            }
        };

        info!(%key, attempt, max = self.config.max_attempts, "hydration started");
        let job = Job {
            key,
            keys,
            conversation_id: conversation_id.to_string(),
            local_message_id: message.id.clone(),
        };
        tokio::spawn(Arc::clone(self).run(job));
        ScheduleOutcome::Started { attempt }
    }

    fn try_acquire(&self, key: &FetchKey) -> Result<u32, ScheduleOutcome> {
        match self.states.entry(key.clone()) {
            Entry::Occupied(mut e) => {
                let st = e.get_mut();
                if st.phase == FetchPhase::Found {
                    return Err(ScheduleOutcome::AlreadyResolved);
                }
                if st.attempts >= self.config.max_attempts {
                    return Err(ScheduleOutcome::Exhausted);
                }
                if st.locked {
                    return Err(ScheduleOutcome::InFlight);
                }
                st.attempts += 1;
                st.locked = true;
                st.phase = FetchPhase::Fetching;
                Ok(st.attempts)
            }
            Entry::Vacant(e) => {
                if self.config.max_attempts == 0 {
                    return Err(ScheduleOutcome::Exhausted);
                }
                e.insert(FetchState {
                    attempts: 1,
                    locked: true,
                    phase: FetchPhase::Fetching,
                });
                Ok(1)
            }
        }
    }

    /// Bump the attempt count for a retry the hydrator owns. The lock is
    /// already held, so no render can have slipped in.
    fn retry_acquire(&self, key: &FetchKey) -> Option<u32> {
        let mut st = self.states.get_mut(key)?;
        if st.attempts >= self.config.max_attempts {
            return None;
        }
        st.attempts += 1;
        st.phase = FetchPhase::Fetching;
        Some(st.attempts)
    }

    async fn run(self: Arc<Self>, job: Job) {
        loop {
            if let Some(reference) = self.attempt(&job).await {
                self.resolve(&job, reference).await;
                return;
            }

            let attempts = self.mark_miss(&job.key);
            if attempts >= self.config.max_attempts {
                warn!(key = %job.key, attempts, "hydration exhausted; placeholder stays");
                self.emit(HydrationEvent::Exhausted {
                    key: job.key.clone(),
                    attempts,
                });
                return;
            }

            debug!(
                key = %job.key,
                attempts,
                cooldown_ms = self.config.retry_cooldown.as_millis() as u64,
                "hydration miss; cooling down"
            );
            tokio::time::sleep(self.config.retry_cooldown).await;

            if self.config.auto_retry {
                match self.retry_acquire(&job.key) {
                    Some(attempt) => {
                        self.emit(HydrationEvent::Retrying {
                            key: job.key.clone(),
                            attempt,
                        });
                        continue;
                    }
                    None => {
                        self.release(&job.key);
                        return;
                    }
                }
            }

            self.release(&job.key);
            self.emit(HydrationEvent::RetryReady {
                key: job.key.clone(),
                attempts,
            });
            return;
        }
    }

    /// One pass over the collaborators: blob store, then remote lookup.
    async fn attempt(&self, job: &Job) -> Option<MediaReference> {
        let message_id = &job.keys.message_id;

        match self.blobs.lookup(&self.config.namespace, message_id).await {
            Ok(Some(blob)) if blob.is_usable() => {
                debug!(key = %job.key, "media found in blob store");
                return MediaReference::new(blob.data_url);
            }
            Ok(_) => {}
            Err(e) => warn!(key = %job.key, error = %e, "blob store lookup failed"),
        }

        let remote = self.remote.as_ref()?;
        if !self.api.has_credentials() {
            debug!(key = %job.key, "remote lookup skipped: no credentials");
            return None;
        }

        match remote
            .find_media(&self.api, message_id, &job.keys.remote_jid, job.key.media_type)
            .await
        {
            Ok(Some(url)) => {
                debug!(key = %job.key, "media found via remote lookup");
                MediaReference::new(url)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %job.key, error = %e, "remote media lookup failed");
                None
            }
        }
    }

    async fn resolve(&self, job: &Job, reference: MediaReference) {
        if let Some(mut st) = self.states.get_mut(&job.key) {
            st.phase = FetchPhase::Found;
            st.locked = true;
        }

        let patch = MessagePatch::Media {
            message_id: job.local_message_id.clone(),
            reference: reference.clone(),
        };
        match self.snapshots.apply(&job.conversation_id, &patch) {
            Ok(_) => info!(key = %job.key, conversation_id = %job.conversation_id, "media hydrated"),
            Err(e) => warn!(key = %job.key, error = %e, "hydrated media could not be patched"),
        }

        self.emit(HydrationEvent::Found {
            key: job.key.clone(),
            conversation_id: job.conversation_id.clone(),
            reference,
        });

        tokio::time::sleep(self.config.success_cooldown).await;
        self.states.remove(&job.key);
        debug!(key = %job.key, "hydration cooldown over; key evicted");
    }

    /// Record a failed attempt and return the attempt count.
    fn mark_miss(&self, key: &FetchKey) -> u32 {
        let Some(mut st) = self.states.get_mut(key) else {
            return self.config.max_attempts;
        };
        if st.attempts >= self.config.max_attempts {
            st.phase = FetchPhase::Exhausted;
            st.locked = false;
        } else {
            st.phase = FetchPhase::RetryWait;
        }
        st.attempts
    }

    fn release(&self, key: &FetchKey) {
        if let Some(mut st) = self.states.get_mut(key) {
            st.locked = false;
        }
    }

    fn emit(&self, event: HydrationEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver just means nobody is rendering.
            let _ = tx.send(event);
        }
    }
}
