use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::info;

use wadesk_chat::ChatEngine;
use wadesk_core::config::WadeskConfig;
use wadesk_core::snapshot::{InMemorySnapshots, SnapshotStore};
use wadesk_core::types::{AuthorRole, Conversation, MediaType};
use wadesk_evolution::EvolutionClient;
use wadesk_media::{
    locate_any, locate_media, HydrationEvent, HydratorConfig, MediaHydrator, ScheduleOutcome,
    SqliteBlobStore,
};
use wadesk_preview::{EnsureOutcome, HttpPreviewFetcher, LinkPreviewCache};

#[derive(Parser)]
#[command(name = "wadesk", version, about = "WhatsApp support console engine")]
struct Cli {
    /// Config file (default: $WADESK_CONFIG, then ~/.wadesk/wadesk.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the phone number a send to this conversation would target.
    Resolve {
        /// Conversation JSON file, `-` for stdin.
        conversation: PathBuf,
    },
    /// Find the media reference inside a raw provider payload.
    Locate {
        /// Payload JSON file, `-` for stdin.
        payload: PathBuf,
        /// Media type to look for; any type when omitted.
        #[arg(long = "type")]
        media_type: Option<MediaType>,
    },
    /// Strip agent signatures from message text.
    Normalize {
        text: String,
        #[arg(long, value_enum, default_value_t = RoleArg::Agent)]
        role: RoleArg,
    },
    /// Fetch link preview metadata.
    Preview { urls: Vec<String> },
    /// Hydrate one message's media and print the result.
    Hydrate {
        /// Conversation JSON file, `-` for stdin.
        conversation: PathBuf,
        /// Local id of the message to hydrate.
        message_id: String,
    },
    /// Persist the inline media blob of a `messages.upsert` webhook.
    IngestWebhook {
        /// Webhook JSON file, `-` for stdin.
        payload: PathBuf,
    },
    /// Send a text to the conversation's contact through the gateway.
    Send {
        /// Conversation JSON file, `-` for stdin.
        conversation: PathBuf,
        text: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Customer,
    Agent,
    System,
}

impl From<RoleArg> for AuthorRole {
    fn from(r: RoleArg) -> Self {
        match r {
            RoleArg::Customer => AuthorRole::Customer,
            RoleArg::Agent => AuthorRole::Agent,
            RoleArg::System => AuthorRole::System,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wadesk=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // load config: --config > WADESK_CONFIG env > ~/.wadesk/wadesk.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("WADESK_CONFIG").ok());
    let config = WadeskConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        WadeskConfig::default()
    });

    match cli.command {
        Command::Resolve { conversation } => {
            let conv: Conversation = read_json(&conversation)?;
            match wadesk_identity::resolve(&conv) {
                Some(r) => print_json(&json!({ "number": r.number.as_str(), "stage": r.stage })),
                None => bail!("conversation {} has no sendable phone number", conv.id),
            }
        }
        Command::Locate { payload, media_type } => {
            let raw: Value = read_json(&payload)?;
            let found = match media_type {
                Some(t) => locate_media(&raw, t).map(|r| (Some(t), r)),
                None => locate_any(&raw),
            };
            let Some((t, reference)) = found else {
                bail!("no media reference in payload");
            };
            let mime = t.map(|t| t.default_mime()).unwrap_or("application/octet-stream");
            print_json(&json!({
                "type": t.map(|t| t.as_str()),
                "reference": reference.as_str(),
                "src": reference.to_renderable(mime),
            }))
        }
        Command::Normalize { text, role } => {
            println!("{}", wadesk_chat::normalize(&text, role.into()));
            Ok(())
        }
        Command::Preview { urls } => preview(&config, urls).await,
        Command::Hydrate {
            conversation,
            message_id,
        } => hydrate(&config, read_json(&conversation)?, &message_id).await,
        Command::IngestWebhook { payload } => {
            let raw: Value = read_json(&payload)?;
            let blobs = open_blob_store(&config)?;
            let stored = blobs.record_webhook(&config.evolution.instance, &raw)?;
            print_json(&json!({ "stored": stored }))
        }
        Command::Send { conversation, text } => {
            send(&config, read_json(&conversation)?, &text).await
        }
    }
}

async fn preview(config: &WadeskConfig, urls: Vec<String>) -> anyhow::Result<()> {
    let fetcher = Arc::new(HttpPreviewFetcher::new(&config.preview)?);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cache = Arc::new(
        LinkPreviewCache::new(fetcher, config.preview.secure_page).with_updates(tx),
    );

    let mut pending = Vec::new();
    for url in &urls {
        if let EnsureOutcome::Started(key) = cache.ensure_preview(url) {
            pending.push(key);
        }
    }
    let mut remaining = pending.len();
    while remaining > 0 {
        if rx.recv().await.is_none() {
            break;
        }
        remaining -= 1;
    }

    let results: Vec<Value> = pending
        .iter()
        .map(|url| json!({ "url": url, "entry": cache.get(url) }))
        .collect();
    print_json(&Value::Array(results))
}

async fn hydrate(
    config: &WadeskConfig,
    conversation: Conversation,
    message_id: &str,
) -> anyhow::Result<()> {
    let message = conversation
        .message(message_id)
        .cloned()
        .with_context(|| format!("message {message_id} not in conversation"))?;
    let Some(media_type) = message.kind.media_type() else {
        bail!("message {message_id} is not a media message");
    };

    let conversation_id = conversation.id.clone();
    let snapshots = Arc::new(InMemorySnapshots::new());
    snapshots.insert(conversation);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let hydrator = Arc::new(
        MediaHydrator::new(
            HydratorConfig::from_config(&config.media, &config.evolution.instance),
            Arc::new(open_blob_store(config)?),
            snapshots.clone(),
        )
        .with_remote(
            Arc::new(EvolutionClient::new(config.evolution.clone())?),
            config.evolution.clone(),
        )
        .with_events(tx),
    );

    match hydrator.schedule(&conversation_id, &message, media_type) {
        ScheduleOutcome::Started { attempt } => info!(attempt, "hydration started"),
        other => bail!("hydration not started: {other:?}"),
    }

    while let Some(event) = rx.recv().await {
        match event {
            HydrationEvent::Found { reference, .. } => {
                let conv = snapshots.current(&conversation_id);
                return print_json(&json!({
                    "reference": reference.as_str(),
                    "src": reference.to_renderable(media_type.default_mime()),
                    "conversation": conv,
                }));
            }
            HydrationEvent::Exhausted { attempts, .. } => {
                bail!("media not found after {attempts} attempts");
            }
            HydrationEvent::RetryReady { attempts, .. } => {
                bail!("media not found yet ({attempts} attempts); auto_retry is off");
            }
            HydrationEvent::Retrying { attempt, .. } => info!(attempt, "retrying"),
        }
    }
    bail!("hydrator stopped without a result")
}

async fn send(config: &WadeskConfig, conversation: Conversation, text: &str) -> anyhow::Result<()> {
    let conversation_id = conversation.id.clone();
    let snapshots = Arc::new(InMemorySnapshots::new());
    snapshots.insert(conversation);

    let client = Arc::new(EvolutionClient::new(config.evolution.clone())?);
    let hydrator = Arc::new(MediaHydrator::new(
        HydratorConfig::from_config(&config.media, &config.evolution.instance),
        Arc::new(open_blob_store(config)?),
        snapshots.clone(),
    ));
    let engine = ChatEngine::new(snapshots, hydrator).with_sender(client);

    let receipt = engine.send_text(&conversation_id, text).await?;
    print_json(&json!({
        "number": receipt.number,
        "message": receipt.message,
    }))
}

fn open_blob_store(config: &WadeskConfig) -> anyhow::Result<SqliteBlobStore> {
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(SqliteBlobStore::new(db)?)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
