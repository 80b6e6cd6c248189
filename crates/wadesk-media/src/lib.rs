pub mod blob;
pub mod db;
pub mod error;
pub mod hydrator;
pub mod locator;
pub mod lookup;
pub mod types;

pub use blob::{BlobStore, SqliteBlobStore};
pub use error::MediaError;
pub use hydrator::{HydratorConfig, MediaHydrator};
pub use locator::{locate_any, locate_media, message_keys, MessageKeys, PayloadShape};
pub use lookup::RemoteMediaLookup;
pub use types::{FetchKey, FetchPhase, FetchState, HydrationEvent, ScheduleOutcome, StoredBlob};
