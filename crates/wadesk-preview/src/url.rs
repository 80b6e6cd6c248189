use regex::Regex;

/// Canonical cache key for a link as typed in a message.
///
/// A link without a scheme gets `https://` when the console page is served
/// securely, `http://` otherwise. Returns `None` for blank input.
pub fn normalize_url(raw: &str, secure_page: bool) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if has_scheme(trimmed) {
        return Some(trimmed.to_string());
    }
    let scheme = if secure_page { "https" } else { "http" };
    Some(format!("{scheme}://{trimmed}"))
}

fn has_scheme(url: &str) -> bool {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://")
        .map(|re| re.is_match(url))
        .unwrap_or(false)
}

/// Linkable tokens in message text, in order of appearance, without duplicates.
///
/// Matches explicit `http(s)://` links and bare `www.` hosts. Trailing
/// sentence punctuation is not part of the link.
pub fn extract_urls(text: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"']+"#) else {
        return Vec::new();
    };
    let mut urls: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let url = m
            .as_str()
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | ')' | ']'));
        if url.len() > 4 && !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}
