use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;
use wadesk_core::config::PreviewConfig;

use crate::cache::LinkPreview;
use crate::error::{PreviewError, Result};

/// Fetches preview metadata for a normalized URL.
#[async_trait]
pub trait PreviewFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<LinkPreview>;
}

/// Pull Open Graph metadata straight from the page HTML.
pub struct HttpPreviewFetcher {
    client: reqwest::Client,
}

impl HttpPreviewFetcher {
    pub fn new(config: &PreviewConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PreviewFetcher for HttpPreviewFetcher {
    async fn fetch(&self, url: &str) -> Result<LinkPreview> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PreviewError::Status {
                status: status.as_u16(),
            });
        }
        let body = resp.text().await?;
        debug!(url, bytes = body.len(), "preview page fetched");

        let mut preview = parse_html(&body);
        preview.image = preview.image.map(|img| absolutize(url, &img));
        if preview.title.is_none() && preview.description.is_none() && preview.image.is_none() {
            return Err(PreviewError::NoMetadata);
        }
        Ok(preview)
    }
}

/// Extract title, description and image from page markup.
///
/// `og:*` tags win over `<title>` and `<meta name="description">`.
pub fn parse_html(html: &str) -> LinkPreview {
    let (Ok(meta_re), Ok(attr_re)) = (
        Regex::new(r"(?is)<meta\b[^>]*>"),
        Regex::new(r#"(?is)\b(property|name|content)\s*=\s*(?:"([^"]*)"|'([^']*)')"#),
    ) else {
        return LinkPreview::default();
    };

    let mut og_title = None;
    let mut og_description = None;
    let mut og_image = None;
    let mut description = None;

    for tag in meta_re.find_iter(html) {
        let mut key = None;
        let mut content = None;
        for cap in attr_re.captures_iter(tag.as_str()) {
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .map(|m| m.as_str())
                .unwrap_or("");
            match cap[1].to_ascii_lowercase().as_str() {
                "content" => content = Some(value.to_string()),
                _ => key = Some(value.to_ascii_lowercase()),
            }
        }
        let (Some(key), Some(content)) = (key, content.and_then(clean)) else {
            continue;
        };
        match key.as_str() {
            "og:title" => og_title.get_or_insert(content),
            "og:description" => og_description.get_or_insert(content),
            "og:image" | "og:image:url" => og_image.get_or_insert(content),
            "description" => description.get_or_insert(content),
            _ => continue,
        };
    }

    let title = og_title.or_else(|| {
        Regex::new(r"(?is)<title[^>]*>(.*?)</title>")
            .ok()
            .and_then(|re| re.captures(html).map(|c| c[1].to_string()))
            .and_then(clean)
    });

    LinkPreview {
        title,
        description: og_description.or(description),
        image: og_image,
    }
}

fn clean(raw: String) -> Option<String> {
    let decoded = raw
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Resolve protocol-relative and root-relative image paths against the page.
fn absolutize(page: &str, image: &str) -> String {
    if image.starts_with("http://") || image.starts_with("https://") {
        return image.to_string();
    }
    let scheme_end = page.find("://").map(|i| i + 3).unwrap_or(0);
    if let Some(rest) = image.strip_prefix("//") {
        return format!("{}{rest}", &page[..scheme_end]);
    }
    if image.starts_with('/') {
        let host_end = page[scheme_end..]
            .find('/')
            .map(|i| scheme_end + i)
            .unwrap_or(page.len());
        return format!("{}{image}", &page[..host_end]);
    }
    image.to_string()
}
