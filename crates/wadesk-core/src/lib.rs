pub mod config;
pub mod delivery;
pub mod error;
pub mod snapshot;
pub mod types;

pub use delivery::{DeliveryStatus, MessagePatch};
pub use error::{CoreError, Result};
pub use snapshot::{InMemorySnapshots, SnapshotStore};
pub use types::{
    AuthorRole, Conversation, ConversationStatus, MediaRefKind, MediaReference, MediaType,
    Message, MessageKind,
};
