use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use wadesk_chat::{ChatEngine, ChatError, MediaView, OutboundSender};
use wadesk_core::delivery::DeliveryStatus;
use wadesk_core::snapshot::{InMemorySnapshots, SnapshotStore};
use wadesk_core::types::{
    AuthorRole, Conversation, MediaReference, MediaType, Message, MessageKind,
};
use wadesk_core::CoreError;
use wadesk_identity::PhoneNumber;
use wadesk_media::error::Result as MediaResult;
use wadesk_media::{BlobStore, FetchKey, HydratorConfig, MediaHydrator, StoredBlob};
use wadesk_preview::error::Result as PreviewResult;
use wadesk_preview::{EnsureOutcome, LinkPreview, LinkPreviewCache, PreviewFetcher};

const CONV: &str = "5511999998888@s.whatsapp.net";

struct FakeSender {
    calls: AtomicUsize,
    fail: bool,
}

impl FakeSender {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutboundSender for FakeSender {
    async fn send_text(&self, number: &PhoneNumber, _text: &str) -> Result<Option<String>, ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(number.as_str(), "5511999998888");
        if self.fail {
            return Err(ChatError::SendFailed("gateway unreachable".to_string()));
        }
        Ok(Some("3EB0AAA".to_string()))
    }
}

struct NoBlobs;

#[async_trait]
impl BlobStore for NoBlobs {
    async fn lookup(&self, _namespace: &str, _message_id: &str) -> MediaResult<Option<StoredBlob>> {
        Ok(None)
    }
}

struct StaticPreview;

#[async_trait]
impl PreviewFetcher for StaticPreview {
    async fn fetch(&self, _url: &str) -> PreviewResult<LinkPreview> {
        Ok(LinkPreview::default())
    }
}

fn engine_with(conversation: Conversation, sender: Arc<FakeSender>) -> (ChatEngine, Arc<InMemorySnapshots>) {
    let snapshots = Arc::new(InMemorySnapshots::new());
    snapshots.insert(conversation);
    let hydrator = Arc::new(MediaHydrator::new(
        HydratorConfig {
            auto_retry: false,
            ..HydratorConfig::default()
        },
        Arc::new(NoBlobs),
        snapshots.clone(),
    ));
    let engine = ChatEngine::new(snapshots.clone(), hydrator).with_sender(sender);
    (engine, snapshots)
}

#[tokio::test]
async fn unsendable_conversation_never_reaches_the_gateway() {
    let sender = FakeSender::new(false);
    let (engine, snapshots) = engine_with(Conversation::new("chat_123"), sender.clone());

    let err = engine.send_text("chat_123", "Olá").await.unwrap_err();
    assert!(matches!(err, ChatError::UnresolvableIdentity { .. }));
    assert_eq!(err.code(), "UNRESOLVABLE_IDENTITY");
    assert_eq!(sender.calls(), 0);
    assert!(snapshots.current("chat_123").unwrap().messages.is_empty());
}

#[tokio::test]
async fn successful_send_is_acknowledged() {
    let sender = FakeSender::new(false);
    let (engine, snapshots) = engine_with(Conversation::new(CONV), sender.clone());

    let receipt = engine.send_text(CONV, "Ana:\nOlá!").await.unwrap();
    assert_eq!(receipt.number, "5511999998888");
    assert_eq!(receipt.message.delivery, DeliveryStatus::Sent);
    assert_eq!(receipt.message.provider_id.as_deref(), Some("3EB0AAA"));
    assert_eq!(receipt.message.role, AuthorRole::Agent);
    assert_eq!(sender.calls(), 1);

    let conv = snapshots.current(CONV).unwrap();
    assert_eq!(conv.messages.len(), 1);
    assert_eq!(engine.render_content(&conv.messages[0]), "Olá!");
}

#[tokio::test]
async fn failed_send_marks_message_error() {
    let sender = FakeSender::new(true);
    let (engine, snapshots) = engine_with(Conversation::new(CONV), sender.clone());

    let err = engine.send_text(CONV, "Olá").await.unwrap_err();
    assert!(matches!(err, ChatError::SendFailed(_)));
    let conv = snapshots.current(CONV).unwrap();
    assert_eq!(conv.messages[0].delivery, DeliveryStatus::Error);
    assert!(conv.messages[0].provider_id.is_none());
}

#[tokio::test]
async fn receipts_only_move_forward() {
    let sender = FakeSender::new(false);
    let (engine, _snapshots) = engine_with(Conversation::new(CONV), sender);
    engine.send_text(CONV, "Olá").await.unwrap();

    let conv = engine.acknowledge(CONV, "3EB0AAA", DeliveryStatus::Delivered).unwrap();
    assert_eq!(conv.messages[0].delivery, DeliveryStatus::Delivered);
    let conv = engine.acknowledge(CONV, "3EB0AAA", DeliveryStatus::Read).unwrap();
    assert_eq!(conv.messages[0].delivery, DeliveryStatus::Read);

    let err = engine
        .acknowledge(CONV, "3EB0AAA", DeliveryStatus::Delivered)
        .unwrap_err();
    assert!(matches!(err, ChatError::Core(CoreError::InvalidTransition { .. })));

    let err = engine.acknowledge(CONV, "UNKNOWN", DeliveryStatus::Read).unwrap_err();
    assert!(matches!(err, ChatError::Core(CoreError::MessageNotFound { .. })));
}

#[tokio::test]
async fn missing_conversation_is_reported() {
    let (engine, _) = engine_with(Conversation::new(CONV), FakeSender::new(false));
    let err = engine.send_text("other@s.whatsapp.net", "oi").await.unwrap_err();
    assert_eq!(err.code(), "CONVERSATION_NOT_FOUND");
}

#[tokio::test]
async fn media_views() {
    let (engine, _) = engine_with(Conversation::new(CONV), FakeSender::new(false));

    let text = Message {
        id: "m0".to_string(),
        content: "oi".to_string(),
        ..Default::default()
    };
    assert_eq!(engine.render_media(CONV, &text), MediaView::NotMedia);

    let known = Message {
        id: "m1".to_string(),
        kind: MessageKind::Image,
        media: MediaReference::new("https://example.com/a.jpg"),
        ..Default::default()
    };
    assert!(matches!(
        engine.render_media(CONV, &known),
        MediaView::Ready { src, .. } if src == "https://example.com/a.jpg"
    ));

    let cdn = Message {
        id: "m2".to_string(),
        kind: MessageKind::Audio,
        raw: Some(json!({
            "message": {"audioMessage": {"directPath": "/v/t62.7117-24/abc.enc", "mimetype": "audio/ogg"}}
        })),
        ..Default::default()
    };
    assert!(matches!(
        engine.render_media(CONV, &cdn),
        MediaView::Ready { src, .. } if src == "https://mmg.whatsapp.net/v/t62.7117-24/abc.enc"
    ));
}

#[tokio::test(start_paused = true)]
async fn unlocatable_media_gets_placeholder_and_hydration() {
    let (engine, _) = engine_with(Conversation::new(CONV), FakeSender::new(false));
    let msg = Message {
        id: "m3".to_string(),
        kind: MessageKind::Video,
        raw: Some(json!({
            "key": {"id": "3EB0VID", "remoteJid": CONV},
            "message": {"videoMessage": {"seconds": 12}}
        })),
        ..Default::default()
    };
    assert_eq!(engine.render_media(CONV, &msg), MediaView::Placeholder);
    let state = engine
        .hydrator()
        .state(&FetchKey::new(MediaType::Video, "3EB0VID"))
        .unwrap();
    assert_eq!(state.attempts, 1);

    // Re-rendering during the cooldown does not start another attempt.
    assert_eq!(engine.render_media(CONV, &msg), MediaView::Placeholder);
    let state = engine
        .hydrator()
        .state(&FetchKey::new(MediaType::Video, "3EB0VID"))
        .unwrap();
    assert_eq!(state.attempts, 1);
}

#[tokio::test]
async fn previews_requested_for_links_in_content() {
    let snapshots = Arc::new(InMemorySnapshots::new());
    let hydrator = Arc::new(MediaHydrator::new(
        HydratorConfig::default(),
        Arc::new(NoBlobs),
        snapshots.clone(),
    ));
    let previews = Arc::new(LinkPreviewCache::new(Arc::new(StaticPreview), true));
    let engine = ChatEngine::new(snapshots, hydrator).with_previews(previews);

    let msg = Message {
        content: "Ana:\nveja www.example.com e www.example.com".to_string(),
        role: AuthorRole::Agent,
        ..Default::default()
    };
    let outcomes = engine.request_previews(&msg);
    assert_eq!(
        outcomes,
        vec![EnsureOutcome::Started("https://www.example.com".to_string())]
    );
}
