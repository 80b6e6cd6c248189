// Hydration state machine: dedup, cooldowns, attempt budget, snapshot patching.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use wadesk_core::config::EvolutionConfig;
use wadesk_core::snapshot::{InMemorySnapshots, SnapshotStore};
use wadesk_core::types::{Conversation, MediaType, Message, MessageKind};
use wadesk_media::error::{MediaError, Result};
use wadesk_media::{
    BlobStore, FetchKey, FetchPhase, HydrationEvent, HydratorConfig, MediaHydrator,
    RemoteMediaLookup, ScheduleOutcome, StoredBlob,
};

const CONV: &str = "5511999998888@s.whatsapp.net";
const PROVIDER_ID: &str = "3EB0C0FFEE";

/// Blob store that starts returning a blob after `hit_after` misses.
struct FakeBlobs {
    calls: AtomicUsize,
    hit_after: Option<usize>,
}

impl FakeBlobs {
    fn never() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            hit_after: None,
        })
    }

    fn after(misses: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            hit_after: Some(misses),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for FakeBlobs {
    async fn lookup(&self, _namespace: &str, _message_id: &str) -> Result<Option<StoredBlob>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.hit_after {
            Some(misses) if n >= misses => Ok(Some(StoredBlob {
                data_url: "data:image/jpeg;base64,/9j/4AAQ".to_string(),
                mime_type: Some("image/jpeg".to_string()),
            })),
            _ => Ok(None),
        }
    }
}

struct FakeRemote {
    calls: AtomicUsize,
    answer: Option<&'static str>,
    fail: bool,
}

#[async_trait]
impl RemoteMediaLookup for FakeRemote {
    async fn find_media(
        &self,
        _api: &EvolutionConfig,
        _message_id: &str,
        _remote_jid: &str,
        _media_type: MediaType,
    ) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MediaError::Remote("502 bad gateway".to_string()));
        }
        Ok(self.answer.map(str::to_string))
    }
}

fn image_message() -> Message {
    Message {
        id: "local-1".to_string(),
        kind: MessageKind::Image,
        raw: Some(json!({
            "key": {"id": PROVIDER_ID, "remoteJid": CONV},
            "message": {"imageMessage": {}}
        })),
        ..Default::default()
    }
}

fn snapshots() -> Arc<InMemorySnapshots> {
    let s = Arc::new(InMemorySnapshots::new());
    s.insert(Conversation {
        id: CONV.to_string(),
        messages: vec![image_message()],
        ..Default::default()
    });
    s
}

fn config(auto_retry: bool) -> HydratorConfig {
    HydratorConfig {
        auto_retry,
        ..HydratorConfig::default()
    }
}

fn key() -> FetchKey {
    FetchKey::new(MediaType::Image, PROVIDER_ID)
}

fn creds() -> EvolutionConfig {
    EvolutionConfig {
        base_url: "http://evo.local".to_string(),
        api_key: "secret".to_string(),
        instance: "inst".to_string(),
    }
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn miss_without_credentials_enters_retry_wait() {
    let blobs = FakeBlobs::never();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let hydrator = Arc::new(
        MediaHydrator::new(config(false), blobs.clone(), snapshots()).with_events(tx),
    );

    let outcome = hydrator.schedule(CONV, &image_message(), MediaType::Image);
    assert_eq!(outcome, ScheduleOutcome::Started { attempt: 1 });
    settle().await;

    let st = hydrator.state(&key()).unwrap();
    assert_eq!(st.attempts, 1);
    assert_eq!(st.phase, FetchPhase::RetryWait);
    assert!(st.locked);

    // Still cooling down: a second render is refused.
    assert_eq!(
        hydrator.schedule(CONV, &image_message(), MediaType::Image),
        ScheduleOutcome::InFlight
    );

    let ev = rx.recv().await.unwrap();
    assert_eq!(
        ev,
        HydrationEvent::RetryReady {
            key: key(),
            attempts: 1
        }
    );
    assert!(!hydrator.state(&key()).unwrap().locked);
    assert_eq!(blobs.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_cooldown_is_four_seconds() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let hydrator = Arc::new(
        MediaHydrator::new(config(false), FakeBlobs::never(), snapshots()).with_events(tx),
    );
    let start = tokio::time::Instant::now();
    hydrator.schedule(CONV, &image_message(), MediaType::Image);
    rx.recv().await.unwrap();
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(4) && waited < Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn sixth_failure_exhausts_and_reset_rearms() {
    let blobs = FakeBlobs::never();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let hydrator = Arc::new(
        MediaHydrator::new(config(false), blobs.clone(), snapshots()).with_events(tx),
    );

    for attempt in 1..=6u32 {
        assert_eq!(
            hydrator.schedule(CONV, &image_message(), MediaType::Image),
            ScheduleOutcome::Started { attempt }
        );
        let ev = rx.recv().await.unwrap();
        if attempt < 6 {
            assert_eq!(ev, HydrationEvent::RetryReady { key: key(), attempts: attempt });
        } else {
            assert_eq!(ev, HydrationEvent::Exhausted { key: key(), attempts: 6 });
        }
    }

    assert_eq!(
        hydrator.schedule(CONV, &image_message(), MediaType::Image),
        ScheduleOutcome::Exhausted
    );
    let st = hydrator.state(&key()).unwrap();
    assert_eq!(st.phase, FetchPhase::Exhausted);
    assert_eq!(st.attempts, 6);
    assert_eq!(blobs.calls(), 6);

    assert!(hydrator.reset(&key()));
    assert_eq!(
        hydrator.schedule(CONV, &image_message(), MediaType::Image),
        ScheduleOutcome::Started { attempt: 1 }
    );
}

#[tokio::test(start_paused = true)]
async fn blob_hit_patches_snapshot_and_holds_lock() {
    let store = snapshots();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let hydrator = Arc::new(
        MediaHydrator::new(config(false), FakeBlobs::after(0), store.clone()).with_events(tx),
    );

    hydrator.schedule(CONV, &image_message(), MediaType::Image);
    match rx.recv().await.unwrap() {
        HydrationEvent::Found { reference, conversation_id, .. } => {
            assert_eq!(conversation_id, CONV);
            assert!(reference.as_str().starts_with("data:image/jpeg"));
        }
        other => panic!("expected Found, got {other:?}"),
    }

    let conv = store.current(CONV).unwrap();
    let media = conv.message("local-1").unwrap().media.clone().unwrap();
    assert_eq!(media.as_str(), "data:image/jpeg;base64,/9j/4AAQ");

    assert_eq!(
        hydrator.schedule(CONV, &image_message(), MediaType::Image),
        ScheduleOutcome::AlreadyResolved
    );

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(hydrator.state(&key()).is_none(), "entry evicted after success cooldown");
}

#[tokio::test(start_paused = true)]
async fn remote_lookup_needs_credentials() {
    let remote = Arc::new(FakeRemote {
        calls: AtomicUsize::new(0),
        answer: Some("https://mmg.whatsapp.net/v/t62/remote.enc"),
        fail: false,
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let without = Arc::new(
        MediaHydrator::new(config(false), FakeBlobs::never(), snapshots())
            .with_remote(remote.clone(), EvolutionConfig::default())
            .with_events(tx),
    );
    without.schedule(CONV, &image_message(), MediaType::Image);
    assert!(matches!(rx.recv().await.unwrap(), HydrationEvent::RetryReady { .. }));
    assert_eq!(remote.calls.load(Ordering::SeqCst), 0);

    let store = snapshots();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let with = Arc::new(
        MediaHydrator::new(config(false), FakeBlobs::never(), store.clone())
            .with_remote(remote.clone(), creds())
            .with_events(tx),
    );
    with.schedule(CONV, &image_message(), MediaType::Image);
    assert!(matches!(rx.recv().await.unwrap(), HydrationEvent::Found { .. }));
    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    let conv = store.current(CONV).unwrap();
    assert_eq!(
        conv.message("local-1").unwrap().media.as_ref().unwrap().as_str(),
        "https://mmg.whatsapp.net/v/t62/remote.enc"
    );
}

#[tokio::test(start_paused = true)]
async fn remote_errors_count_as_misses() {
    let remote = Arc::new(FakeRemote {
        calls: AtomicUsize::new(0),
        answer: None,
        fail: true,
    });
    let (tx, mut rx) = mpsc::unbounded_channel();
    let hydrator = Arc::new(
        MediaHydrator::new(config(false), FakeBlobs::never(), snapshots())
            .with_remote(remote.clone(), creds())
            .with_events(tx),
    );
    hydrator.schedule(CONV, &image_message(), MediaType::Image);
    assert_eq!(
        rx.recv().await.unwrap(),
        HydrationEvent::RetryReady { key: key(), attempts: 1 }
    );
    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn auto_retry_keeps_going_until_found() {
    let blobs = FakeBlobs::after(2);
    let store = snapshots();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let hydrator = Arc::new(
        MediaHydrator::new(config(true), blobs.clone(), store.clone()).with_events(tx),
    );

    assert_eq!(
        hydrator.schedule(CONV, &image_message(), MediaType::Image),
        ScheduleOutcome::Started { attempt: 1 }
    );
    assert_eq!(
        rx.recv().await.unwrap(),
        HydrationEvent::Retrying { key: key(), attempt: 2 }
    );
    assert_eq!(
        rx.recv().await.unwrap(),
        HydrationEvent::Retrying { key: key(), attempt: 3 }
    );
    assert!(matches!(rx.recv().await.unwrap(), HydrationEvent::Found { .. }));
    assert_eq!(blobs.calls(), 3);
    assert!(store.current(CONV).unwrap().message("local-1").unwrap().media.is_some());
}

#[tokio::test(start_paused = true)]
async fn auto_retry_stops_at_budget() {
    let blobs = FakeBlobs::never();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let hydrator = Arc::new(
        MediaHydrator::new(config(true), blobs.clone(), snapshots()).with_events(tx),
    );
    hydrator.schedule(CONV, &image_message(), MediaType::Image);

    let mut last = None;
    while let Some(ev) = rx.recv().await {
        let done = matches!(ev, HydrationEvent::Exhausted { .. });
        last = Some(ev);
        if done {
            break;
        }
    }
    assert_eq!(last, Some(HydrationEvent::Exhausted { key: key(), attempts: 6 }));
    assert_eq!(blobs.calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn concurrent_renders_start_one_fetch() {
    let blobs = FakeBlobs::never();
    let hydrator = Arc::new(MediaHydrator::new(config(false), blobs.clone(), snapshots()));

    let started = (0..50)
        .map(|_| hydrator.schedule(CONV, &image_message(), MediaType::Image))
        .filter(|o| matches!(o, ScheduleOutcome::Started { .. }))
        .count();
    assert_eq!(started, 1);
    settle().await;
    assert_eq!(blobs.calls(), 1);
}

#[tokio::test]
async fn payload_without_ids_is_a_no_op() {
    let blobs = FakeBlobs::never();
    let hydrator = Arc::new(MediaHydrator::new(config(false), blobs.clone(), snapshots()));
    let mut msg = image_message();
    msg.raw = Some(json!({"message": {"imageMessage": {}}}));
    assert_eq!(
        hydrator.schedule(CONV, &msg, MediaType::Image),
        ScheduleOutcome::MissingKeys
    );
    msg.raw = None;
    assert_eq!(
        hydrator.schedule(CONV, &msg, MediaType::Image),
        ScheduleOutcome::MissingKeys
    );
    assert_eq!(blobs.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn keys_are_per_media_type() {
    let hydrator = Arc::new(MediaHydrator::new(config(false), FakeBlobs::never(), snapshots()));
    assert!(matches!(
        hydrator.schedule(CONV, &image_message(), MediaType::Image),
        ScheduleOutcome::Started { .. }
    ));
    assert!(matches!(
        hydrator.schedule(CONV, &image_message(), MediaType::Sticker),
        ScheduleOutcome::Started { .. }
    ));
}
