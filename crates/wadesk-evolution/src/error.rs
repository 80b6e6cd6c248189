use wadesk_chat::ChatError;
use wadesk_media::MediaError;

/// Errors produced by the Evolution API client.
#[derive(Debug, thiserror::Error)]
pub enum EvolutionError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Evolution API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("no Evolution API base URL or key configured")]
    NoCredentials,
}

impl EvolutionError {
    pub fn is_auth(&self) -> bool {
        matches!(self, EvolutionError::Api { status: 401 | 403, .. })
    }
}

impl From<EvolutionError> for MediaError {
    fn from(e: EvolutionError) -> Self {
        match e {
            EvolutionError::NoCredentials => MediaError::NoCredentials,
            other => MediaError::Remote(other.to_string()),
        }
    }
}

impl From<EvolutionError> for ChatError {
    fn from(e: EvolutionError) -> Self {
        if e.is_auth() {
            return ChatError::AuthFailed(e.to_string());
        }
        match e {
            missing @ EvolutionError::NoCredentials => ChatError::ConfigError(missing.to_string()),
            other => ChatError::SendFailed(other.to_string()),
        }
    }
}
