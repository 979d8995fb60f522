//! Host document surface: character-addressed text plus overlay placeholders.
//!
//! The scheduler never edits document text. It only lays placeholders over
//! character ranges, so offsets recorded at scan time stay valid while bands
//! are incrementally placed.
//!
//! [`Document`] is the seam a host editor implements. [`TextDocument`] is the
//! in-memory implementation used by the CLI, the HTML export and the tests.

use crate::error::SliceError;
use crate::markup::{self, RawLink};
use crate::pipeline::decode::ImageHandle;
use crate::pipeline::slice::Crop;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// Identity of one document instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DocumentId(u64);

impl DocumentId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        DocumentId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to a placeholder laid over a document range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PlaceholderId(u64);

/// What a placeholder displays instead of the text underneath.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Nothing: hides the covered text.
    Blank,
    /// One horizontal band of an image.
    Band { image: ImageHandle, crop: Crop },
    /// A synthetic line break after a band.
    LineBreak,
}

impl Payload {
    pub fn is_blank(&self) -> bool {
        matches!(self, Payload::Blank)
    }

    pub fn is_band(&self) -> bool {
        matches!(self, Payload::Band { .. })
    }
}

/// A placeholder as stored by [`TextDocument`].
#[derive(Debug, Clone)]
pub struct Placeholder {
    pub begin: usize,
    pub end: usize,
    pub payload: Payload,
}

/// The surface a host document exposes to the scheduler.
pub trait Document: Send + 'static {
    /// Identity used to check task ownership.
    fn id(&self) -> DocumentId;

    /// Full document text.
    fn read_text(&self) -> String;

    /// Directory that relative `file` links resolve against.
    fn base_dir(&self) -> Option<&Path> {
        None
    }

    /// All markup links in document order.
    fn links(&self) -> Vec<RawLink> {
        markup::extract_links(&self.read_text())
    }

    /// Lay `payload` over the character range `[begin, end)`.
    fn replace_span(
        &mut self,
        begin: usize,
        end: usize,
        payload: Payload,
    ) -> Result<PlaceholderId, SliceError>;

    /// Remove a placeholder. Returns `false` if it was already gone.
    fn release_placeholder(&mut self, id: PlaceholderId) -> bool;
}

/// A document shared between the host and a render session.
pub type SharedDocument<D> = Arc<Mutex<D>>;

/// In-memory document with an overlay table.
#[derive(Debug)]
pub struct TextDocument {
    id: DocumentId,
    text: String,
    len_chars: usize,
    base_dir: Option<PathBuf>,
    placeholders: BTreeMap<PlaceholderId, Placeholder>,
    next_placeholder: u64,
}

impl TextDocument {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let len_chars = text.chars().count();
        Self {
            id: DocumentId::next(),
            text,
            len_chars,
            base_dir: None,
            placeholders: BTreeMap::new(),
            next_placeholder: 1,
        }
    }

    /// Resolve relative links against `dir`.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Read a document from disk; relative links resolve against its directory.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SliceError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SliceError::InputReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let dir = std::fs::canonicalize(&dir).unwrap_or(dir);
        debug!("Opened document {} ({} bytes)", path.display(), text.len());
        Ok(Self::new(text).with_base_dir(dir))
    }

    /// Wrap for sharing with a render session.
    pub fn into_shared(self) -> SharedDocument<Self> {
        Arc::new(Mutex::new(self))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len_chars(&self) -> usize {
        self.len_chars
    }

    pub fn placeholder(&self, id: PlaceholderId) -> Option<&Placeholder> {
        self.placeholders.get(&id)
    }

    pub fn placeholder_count(&self) -> usize {
        self.placeholders.len()
    }

    /// Live placeholders in creation order.
    pub fn placeholders(&self) -> impl Iterator<Item = (PlaceholderId, &Placeholder)> {
        self.placeholders.iter().map(|(id, p)| (*id, p))
    }

    /// The placeholder displayed at `pos`: the most recent one covering it.
    pub fn overlay_at(&self, pos: usize) -> Option<&Placeholder> {
        self.placeholders
            .values()
            .rev()
            .find(|p| p.begin <= pos && pos < p.end)
    }
}

impl Document for TextDocument {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn read_text(&self) -> String {
        self.text.clone()
    }

    fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    fn replace_span(
        &mut self,
        begin: usize,
        end: usize,
        payload: Payload,
    ) -> Result<PlaceholderId, SliceError> {
        if begin >= end || end > self.len_chars {
            return Err(SliceError::InvalidSpan {
                begin,
                end,
                len: self.len_chars,
            });
        }
        let id = PlaceholderId(self.next_placeholder);
        self.next_placeholder += 1;
        trace!("placeholder {:?} at {}..{}", id, begin, end);
        self.placeholders.insert(
            id,
            Placeholder {
                begin,
                end,
                payload,
            },
        );
        Ok(id)
    }

    fn release_placeholder(&mut self, id: PlaceholderId) -> bool {
        self.placeholders.remove(&id).is_some()
    }
}
