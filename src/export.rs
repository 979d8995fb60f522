//! Standalone HTML preview of a document with its placeholders applied.
//!
//! Text outside placeholders is escaped and kept verbatim (`white-space:
//! pre-wrap`). A blank shows nothing, a band becomes an inline `<img>` with a
//! base64 PNG data URI, and a line break becomes a newline.

use crate::document::{Payload, PlaceholderId, SharedDocument, TextDocument};
use crate::error::SliceError;
use crate::pipeline::encode::encode_band;
use crate::scheduler::lock;
use std::path::Path;
use tracing::{info, warn};

const HTML_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
body { white-space: pre-wrap; font-family: monospace; }
img.band { display: inline-block; vertical-align: top; margin: 0; }
</style>
</head>
<body>
"#;

const HTML_TAIL: &str = "</body>\n</html>\n";

/// Render `document` as an HTML page.
pub fn to_html(document: &TextDocument) -> String {
    let len = document.len_chars();

    // Later placeholders win where they overlap.
    let mut cover: Vec<Option<PlaceholderId>> = vec![None; len];
    for (id, p) in document.placeholders() {
        for slot in &mut cover[p.begin.min(len)..p.end.min(len)] {
            *slot = Some(id);
        }
    }

    let mut out = String::with_capacity(HTML_HEAD.len() + document.text().len() + HTML_TAIL.len());
    out.push_str(HTML_HEAD);

    let mut shown: Option<PlaceholderId> = None;
    for (pos, ch) in document.text().chars().enumerate() {
        match cover[pos] {
            None => {
                shown = None;
                push_escaped(&mut out, ch);
            }
            Some(id) if shown == Some(id) => {}
            Some(id) => {
                shown = Some(id);
                if let Some(p) = document.placeholder(id) {
                    push_payload(&mut out, &p.payload);
                }
            }
        }
    }

    out.push_str(HTML_TAIL);
    out
}

fn push_payload(out: &mut String, payload: &Payload) {
    match payload {
        Payload::Blank => {}
        Payload::LineBreak => out.push('\n'),
        Payload::Band { image, crop } => match encode_band(image, crop) {
            Ok(uri) => {
                out.push_str(r#"<img class="band" alt="" src=""#);
                out.push_str(&uri);
                out.push_str(r#"">"#);
            }
            Err(e) => {
                warn!("Could not encode band: {}", e);
                out.push_str("[band unavailable]");
            }
        },
    }
}

fn push_escaped(out: &mut String, ch: char) {
    match ch {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        c => out.push(c),
    }
}

/// Write the HTML preview of `document` to `path`.
///
/// The document is locked only while the page is rendered. The file is
/// written to a temporary sibling and renamed into place.
pub async fn write_html(
    document: &SharedDocument<TextDocument>,
    path: impl AsRef<Path>,
) -> Result<(), SliceError> {
    let html = to_html(&lock(document));
    let path = path.as_ref();
    let write_err = |e: std::io::Error| SliceError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("html.tmp");
    tokio::fs::write(&tmp_path, &html).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    info!("Wrote HTML preview to {} ({} bytes)", path.display(), html.len());
    Ok(())
}
