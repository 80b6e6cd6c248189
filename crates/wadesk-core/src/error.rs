use thiserror::Error;

use crate::delivery::DeliveryStatus;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Conversation not found: {id}")]
    ConversationNotFound { id: String },

    #[error("Message not found: {id}")]
    MessageNotFound { id: String },

    #[error("Invalid delivery transition: {from} -> {to}")]
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },

    #[error("Provider id already assigned to message {message_id}: {existing}")]
    ProviderIdReassigned {
        message_id: String,
        existing: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Short error code string surfaced to the console UI.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::ConversationNotFound { .. } => "CONVERSATION_NOT_FOUND",
            CoreError::MessageNotFound { .. } => "MESSAGE_NOT_FOUND",
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::ProviderIdReassigned { .. } => "PROVIDER_ID_REASSIGNED",
            CoreError::Serialization(_) => "SERIALIZATION_ERROR",
            CoreError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
