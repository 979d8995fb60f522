//! Org-style bracket link extraction.
//!
//! Hosts with their own parser implement [`crate::document::Document::links`]
//! directly; this module is the default used by [`crate::document::TextDocument`].
//! It recognises `[[target]]` and `[[target][description]]` and reports
//! character offsets, not byte offsets, because placeholders are addressed by
//! character.

use once_cell::sync::Lazy;
use regex::Regex;

/// A link found in document markup, before any eligibility filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLink {
    /// Link type: the URI scheme, `file` for path-like targets, else `fuzzy`.
    pub link_type: String,
    /// Target with the type prefix removed.
    pub path: String,
    /// Target exactly as written between the inner brackets.
    pub raw_link: String,
    /// Character offset of the opening `[[`.
    pub begin: usize,
    /// Character offset just past the closing `]]`.
    pub end: usize,
}

static RE_BRACKET_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\[\]]+)\](?:\[([^\[\]]*)\])?\]").unwrap());

static RE_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*):(.*)$").unwrap());

/// Extract every bracket link in `text`, in document order.
pub fn extract_links(text: &str) -> Vec<RawLink> {
    let mut links = Vec::new();
    let mut byte_cursor = 0usize;
    let mut char_cursor = 0usize;

    for caps in RE_BRACKET_LINK.captures_iter(text) {
        let (Some(whole), Some(target)) = (caps.get(0), caps.get(1)) else {
            continue;
        };

        char_cursor += text[byte_cursor..whole.start()].chars().count();
        let begin = char_cursor;
        let end = begin + whole.as_str().chars().count();
        char_cursor = end;
        byte_cursor = whole.end();

        let raw_link = target.as_str().trim().to_string();
        let (link_type, path) = classify(&raw_link);
        links.push(RawLink {
            link_type,
            path,
            raw_link,
            begin,
            end,
        });
    }

    links
}

/// Split a raw target into `(type, path)`.
fn classify(raw: &str) -> (String, String) {
    if is_path_like(raw) {
        return ("file".to_string(), raw.to_string());
    }
    match RE_SCHEME.captures(raw) {
        Some(caps) => (caps[1].to_ascii_lowercase(), caps[2].to_string()),
        None => ("fuzzy".to_string(), raw.to_string()),
    }
}

fn is_path_like(raw: &str) -> bool {
    raw.starts_with('/') || raw.starts_with("./") || raw.starts_with("../") || raw.starts_with('~')
}
