use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("remote lookup failed: {0}")]
    Remote(String),

    #[error("no media API credentials configured")]
    NoCredentials,

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, MediaError>;
