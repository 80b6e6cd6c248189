//! Classification of provider addresses (JIDs) and stored numbers.
//!
//! WhatsApp addresses look like `<user>@<server>`:
//! - `@s.whatsapp.net` / `@c.us`: an individual; the user part is a phone number
//! - `@g.us`: a group
//! - `@broadcast`, `@lid`, `@newsletter`: broadcast lists, linked-device ids
//!   and channels; the user part is never a phone number
//!
//! The console also mints its own conversation ids (`chat_…`, UUIDs) which
//! must never be mistaken for numbers either.

use uuid::Uuid;

const GROUP_SUFFIXES: &[&str] = &["@g.us"];
const LIST_SUFFIXES: &[&str] = &["@broadcast", "@lid", "@newsletter"];
const SYNTHETIC_PREFIXES: &[&str] = &["chat_", "conv_", "ticket_", "tmp_", "temp_", "local_", "local-"];

/// Characters people put into phone numbers that carry no digits.
const FORMATTING: &[char] = &[' ', '+', '-', '(', ')', '.'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// `<digits>@s.whatsapp.net` and other non-group, non-list addresses.
    Individual,
    Group,
    List,
    /// Console-minted id.
    Synthetic,
    /// No `@`, only digits and formatting characters.
    BareNumber,
    /// Anything else.
    Opaque,
}

pub fn classify(id: &str) -> AddressKind {
    let id = id.trim();
    if is_group(id) {
        AddressKind::Group
    } else if is_list(id) {
        AddressKind::List
    } else if is_synthetic(id) {
        AddressKind::Synthetic
    } else if id.contains('@') {
        AddressKind::Individual
    } else if is_bare_numeric(id) {
        AddressKind::BareNumber
    } else {
        AddressKind::Opaque
    }
}

pub fn is_group(id: &str) -> bool {
    let lower = id.trim().to_ascii_lowercase();
    GROUP_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

/// Broadcast lists, `status@broadcast`, linked-device (`@lid`) ids and channels.
pub fn is_list(id: &str) -> bool {
    let lower = id.trim().to_ascii_lowercase();
    LIST_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

pub fn is_synthetic(id: &str) -> bool {
    let id = id.trim();
    let lower = id.to_ascii_lowercase();
    if SYNTHETIC_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return true;
    }
    let user = id.split('@').next().unwrap_or(id);
    Uuid::parse_str(user).is_ok()
}

/// True when `s` has no `@` and consists only of digits once formatting
/// characters are removed.
pub fn is_bare_numeric(s: &str) -> bool {
    let s = s.trim();
    if s.contains('@') {
        return false;
    }
    let mut saw_digit = false;
    for c in s.chars() {
        if c.is_ascii_digit() {
            saw_digit = true;
        } else if !FORMATTING.contains(&c) {
            return false;
        }
    }
    saw_digit
}

/// The ASCII digits of `s`, in order.
///
/// For addresses only the user part counts, and a device suffix
/// (`5511...:12@s.whatsapp.net`) is dropped.
pub fn digits(s: &str) -> String {
    let user = s.split('@').next().unwrap_or(s);
    let user = user.split(':').next().unwrap_or(user);
    user.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_addresses() {
        assert_eq!(classify("5511999998888@s.whatsapp.net"), AddressKind::Individual);
        assert_eq!(classify("120363001234567890@g.us"), AddressKind::Group);
        assert_eq!(classify("123456789012345@lid"), AddressKind::List);
        assert_eq!(classify("status@broadcast"), AddressKind::List);
        assert_eq!(classify("chat_abc123"), AddressKind::Synthetic);
        assert_eq!(
            classify("0190b5a4-3f1c-7b2e-9a0d-3c4b5a6d7e8f"),
            AddressKind::Synthetic
        );
        assert_eq!(classify("+55 (11) 99999-8888"), AddressKind::BareNumber);
        assert_eq!(classify("support-queue"), AddressKind::Opaque);
    }

    #[test]
    fn digits_ignore_server_and_device() {
        assert_eq!(digits("5511999998888@s.whatsapp.net"), "5511999998888");
        assert_eq!(digits("5511999998888:23@s.whatsapp.net"), "5511999998888");
        assert_eq!(digits("+55 (11) 99999-8888"), "5511999998888");
        assert_eq!(digits("abc"), "");
    }

    #[test]
    fn bare_numeric_rejects_letters_and_at() {
        assert!(is_bare_numeric("5511999998888"));
        assert!(is_bare_numeric("+1 555-123-4567"));
        assert!(!is_bare_numeric("5511999998888@s.whatsapp.net"));
        assert!(!is_bare_numeric("55119x9998888"));
        assert!(!is_bare_numeric("+ - ()"));
        assert!(!is_bare_numeric(""));
    }

    #[test]
    fn suffix_checks_are_case_insensitive() {
        assert!(is_group("120363@G.US"));
        assert!(is_list("123@LID"));
    }
}
