use thiserror::Error;
use wadesk_core::CoreError;

/// Errors surfaced by the chat engine to the console.
#[derive(Debug, Error)]
pub enum ChatError {
    /// No sendable phone number could be derived for the conversation.
    /// Nothing was sent.
    #[error("no sendable phone number for conversation {conversation_id}")]
    UnresolvableIdentity { conversation_id: String },

    /// The provider rejected or never received the message.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The provider rejected the supplied credentials.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The outbound channel is not configured.
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ChatError {
    /// Short machine-readable code for the console's toast messages.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::UnresolvableIdentity { .. } => "UNRESOLVABLE_IDENTITY",
            ChatError::SendFailed(_) => "SEND_FAILED",
            ChatError::AuthFailed(_) => "AUTH_FAILED",
            ChatError::ConfigError(_) => "CONFIG_ERROR",
            ChatError::Core(e) => e.code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
