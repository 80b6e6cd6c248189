pub mod cache;
pub mod error;
pub mod fetcher;
pub mod url;

pub use cache::{EnsureOutcome, LinkPreview, LinkPreviewCache, PreviewEntry, PreviewStatus};
pub use error::PreviewError;
pub use fetcher::{HttpPreviewFetcher, PreviewFetcher};
pub use url::{extract_urls, normalize_url};
