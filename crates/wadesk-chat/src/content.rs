//! Agent signature stripping.
//!
//! Agents' clients prepend a signature such as `"Ana:\n"` or
//! `"Ana - Suporte:\n"` to every outbound text, and forwarded or edited
//! messages can stack several of them. Only the conversational body is shown.

use regex::Regex;
use wadesk_core::types::AuthorRole;

const SIGNATURE_PATTERNS: &[&str] = &[
    // "<name>:\n"
    r"^[^:\n]+:\n",
    // "<name> - <department>:\n"
    r"^[^\n:]+ - [^\n:]+:\n",
    // "<name>: "
    r"^[^:\n]+: ",
];

/// Strip leading agent signatures from `content`.
///
/// A no-op for anything not authored by an agent. Idempotent.
pub fn normalize(content: &str, role: AuthorRole) -> String {
    if role != AuthorRole::Agent {
        return content.to_string();
    }
    let patterns: Vec<Regex> = SIGNATURE_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect();

    let mut text = content.trim_start().to_string();
    loop {
        let Some(stripped) = patterns.iter().find_map(|re| {
            re.find(&text)
                .map(|m| text[m.end()..].trim_start().to_string())
        }) else {
            break;
        };
        if stripped == text {
            break;
        }
        text = stripped;
    }
    text.trim().to_string()
}
