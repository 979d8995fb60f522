//! Link scanning: turn document markup into `Init` tasks.
//!
//! A link is eligible when its target mentions an image extension anywhere,
//! not only as a suffix, so `diagram.drawio.svg` and `a.png?raw=1` both match.
//! `file` and scheme-less links become canonical absolute paths; every other
//! link type is parsed as an absolute URL, which percent-encodes it.

use crate::document::Document;
use crate::error::TaskError;
use crate::markup::RawLink;
use crate::task::{ImageSource, Task};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

static RE_IMAGE_EXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(png|jpe?g|drawio|svg|webp)").unwrap());

/// Whether a raw link target names an image.
pub fn is_image_link(target: &str) -> bool {
    RE_IMAGE_EXT.is_match(target)
}

/// Scan `document` and return one `Init` task per eligible link, in order.
///
/// Links that cannot be resolved are logged and skipped.
pub fn scan<D: Document + ?Sized>(document: &D) -> Vec<Task> {
    let id = document.id();
    let base_dir = document.base_dir();
    let links = document.links();
    let total_links = links.len();

    let tasks: Vec<Task> = links
        .iter()
        .filter(|link| is_image_link(&link.raw_link))
        .filter(|link| link.begin < link.end)
        .filter_map(|link| match resolve_link(link, base_dir) {
            Ok(source) => {
                debug!("Image link at {}..{} → {}", link.begin, link.end, source);
                Some(Task::new(id, link.begin, link.end, source))
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        })
        .collect();

    info!(
        "Scan found {} image links ({} links total)",
        tasks.len(),
        total_links
    );
    tasks
}

/// Resolve a raw link to a fetchable source.
pub fn resolve_link(link: &RawLink, base_dir: Option<&Path>) -> Result<ImageSource, TaskError> {
    // A bare `figure.png` has no scheme; it names a file next to the document.
    if link.link_type == "file" || link.link_type == "fuzzy" {
        return Ok(ImageSource::Local(resolve_file(&link.path, base_dir)));
    }

    let url = Url::parse(&link.raw_link).map_err(|e| TaskError::Discovery {
        link: link.raw_link.clone(),
        reason: e.to_string(),
    })?;
    Ok(ImageSource::Remote(url))
}

/// Canonicalise a `file` link target, following symlinks.
///
/// Missing files still resolve (lexically) so they show up as tasks and
/// fail visibly at fetch time.
fn resolve_file(target: &str, base_dir: Option<&Path>) -> PathBuf {
    // Org search options: file:a.png::*heading
    let target = target.split("::").next().unwrap_or(target);
    let path = expand_home(target);

    let absolute = if path.is_absolute() {
        path
    } else {
        let base = base_dir
            .map(Path::to_path_buf)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        base.join(path)
    };

    std::fs::canonicalize(&absolute).unwrap_or_else(|_| normalize_lexically(&absolute))
}

fn expand_home(target: &str) -> PathBuf {
    if let Some(rest) = target.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(target)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
