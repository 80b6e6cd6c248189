//! Per-URL link preview cache.
//!
//! One fetch per normalized URL for the lifetime of the cache. A failed fetch
//! is cached as `Error` and never retried; the link renders without a card.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::fetcher::PreviewFetcher;
use crate::url::normalize_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStatus {
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkPreview {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewEntry {
    pub status: PreviewStatus,
    pub preview: Option<LinkPreview>,
}

impl PreviewEntry {
    fn loading() -> Self {
        Self {
            status: PreviewStatus::Loading,
            preview: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// A fetch was spawned for this normalized URL.
    Started(String),
    /// An entry exists already, in whatever state.
    Cached(PreviewStatus),
    /// Another caller is fetching this URL right now.
    InFlight,
    /// Nothing to preview (blank input).
    Ignored,
}

pub struct LinkPreviewCache {
    entries: DashMap<String, PreviewEntry>,
    in_flight: DashSet<String>,
    fetcher: Arc<dyn PreviewFetcher>,
    secure_page: bool,
    updates: Option<mpsc::UnboundedSender<String>>,
}

/// Drops the in-flight mark however the fetch task ends.
struct InFlightGuard {
    cache: Arc<LinkPreviewCache>,
    url: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.cache.in_flight.remove(&self.url);
    }
}

impl LinkPreviewCache {
    pub fn new(fetcher: Arc<dyn PreviewFetcher>, secure_page: bool) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashSet::new(),
            fetcher,
            secure_page,
            updates: None,
        }
    }

    /// Receive the normalized URL each time a fetch settles.
    pub fn with_updates(mut self, tx: mpsc::UnboundedSender<String>) -> Self {
        self.updates = Some(tx);
        self
    }

    pub fn get(&self, raw_url: &str) -> Option<PreviewEntry> {
        let url = normalize_url(raw_url, self.secure_page)?;
        self.entries.get(&url).map(|e| e.clone())
    }

    pub fn is_in_flight(&self, raw_url: &str) -> bool {
        normalize_url(raw_url, self.secure_page)
            .map(|url| self.in_flight.contains(&url))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Make sure a preview exists or is being fetched for `raw_url`.
    ///
    /// Idempotent, never blocks on the network.
    pub fn ensure_preview(self: &Arc<Self>, raw_url: &str) -> EnsureOutcome {
        let Some(url) = normalize_url(raw_url, self.secure_page) else {
            return EnsureOutcome::Ignored;
        };

        if let Some(entry) = self.entries.get(&url) {
            return EnsureOutcome::Cached(entry.status);
        }
        if !self.in_flight.insert(url.clone()) {
            return EnsureOutcome::InFlight;
        }

        let guard = InFlightGuard {
            cache: Arc::clone(self),
            url: url.clone(),
        };
        match self.entries.entry(url.clone()) {
            Entry::Occupied(e) => return EnsureOutcome::Cached(e.get().status),
            Entry::Vacant(e) => {
                e.insert(PreviewEntry::loading());
            }
        }

        debug!(url = %url, "link preview fetch started");
        let cache = Arc::clone(self);
        let key = url.clone();
        tokio::spawn(async move {
            let entry = match cache.fetcher.fetch(&key).await {
                Ok(preview) => {
                    info!(url = %key, "link preview ready");
                    PreviewEntry {
                        status: PreviewStatus::Ready,
                        preview: Some(preview),
                    }
                }
                Err(e) => {
                    warn!(url = %key, error = %e, "link preview fetch failed");
                    PreviewEntry {
                        status: PreviewStatus::Error,
                        preview: None,
                    }
                }
            };
            cache.entries.insert(key.clone(), entry);
            drop(guard);
            if let Some(tx) = &cache.updates {
                let _ = tx.send(key);
            }
        });

        EnsureOutcome::Started(url)
    }
}
