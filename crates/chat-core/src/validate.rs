//! Normalization and bounds for untrusted text.
//!
//! These never fail: rejection is an empty result, which `validate_name`
//! and `validate_text` turn into `None`.

/// Maximum display name length, in characters.
pub const MAX_NAME_LEN: usize = 40;

/// Maximum chat message length, in characters.
pub const MAX_TEXT_LEN: usize = 1000;

/// Maximum length of free-form system notice text, in characters.
pub const MAX_SYSTEM_TEXT_LEN: usize = 200;

/// Collapse whitespace runs to a single space, trim, and truncate to
/// `max_len` characters.
pub fn normalize_text(raw: &str, max_len: usize) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_len) {
        // Truncation happens after trimming, so a cut may end on a space.
        Some((cut, _)) => collapsed[..cut].to_string(),
        None => collapsed,
    }
}

/// Normalize a display name; `None` if nothing is left.
pub fn validate_name(raw: &str) -> Option<String> {
    non_empty(normalize_text(raw, MAX_NAME_LEN))
}

/// Normalize chat message text; `None` if nothing is left.
pub fn validate_text(raw: &str) -> Option<String> {
    non_empty(normalize_text(raw, MAX_TEXT_LEN))
}

/// Normalize text for a system notice. Empty input stays empty.
pub fn validate_system_text(raw: &str) -> String {
    normalize_text(raw, MAX_SYSTEM_TEXT_LEN)
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
