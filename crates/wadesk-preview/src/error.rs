use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("preview fetch returned HTTP {status}")]
    Status { status: u16 },

    #[error("page has no preview metadata")]
    NoMetadata,
}

pub type Result<T> = std::result::Result<T, PreviewError>;
