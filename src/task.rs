//! Per-link task records and their status machine.

use crate::document::{DocumentId, PlaceholderId};
use crate::error::TaskError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

/// Rendering progress of one image link.
///
/// Transitions only move forward: `Init → Start → {Finished, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Discovered, not yet scheduled.
    Init,
    /// Span blanked; fetch and decode in flight.
    Start,
    /// Bands placed.
    Finished,
    /// Fetch, decode or placement failed; original text visible.
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Failed)
    }

    fn can_advance_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Init, TaskStatus::Start)
                | (TaskStatus::Init, TaskStatus::Failed)
                | (TaskStatus::Start, TaskStatus::Finished)
                | (TaskStatus::Start, TaskStatus::Failed)
        )
    }
}

/// Whether a link points at the local filesystem or a remote URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Local,
    Remote,
}

/// Resolved location of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Canonical absolute path.
    Local(PathBuf),
    /// Percent-encoded absolute URL.
    Remote(Url),
}

impl ImageSource {
    pub fn kind(&self) -> LinkKind {
        match self {
            ImageSource::Local(_) => LinkKind::Local,
            ImageSource::Remote(_) => LinkKind::Remote,
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Local(p) => write!(f, "{}", p.display()),
            ImageSource::Remote(u) => write!(f, "{u}"),
        }
    }
}

/// One discovered image link and its rendering progress.
#[derive(Debug, Clone)]
pub struct Task {
    status: TaskStatus,
    document: DocumentId,
    begin: usize,
    end: usize,
    source: ImageSource,
    error: Option<TaskError>,
    bands: usize,
    pub(crate) blank: Option<PlaceholderId>,
}

impl Task {
    /// Create an `Init` task covering `[begin, end)`.
    pub fn new(document: DocumentId, begin: usize, end: usize, source: ImageSource) -> Self {
        debug_assert!(begin < end, "task span must be non-empty");
        Self {
            status: TaskStatus::Init,
            document,
            begin,
            end,
            source,
            error: None,
            bands: 0,
            blank: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn kind(&self) -> LinkKind {
        self.source.kind()
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.error.as_ref()
    }

    /// Number of image bands placed for this link.
    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Row cap that keeps `2 × rows` within the original span.
    pub fn max_rows(&self) -> usize {
        (self.end - self.begin) / 2
    }

    /// Advance the status. Regressions and repeats are ignored and return `false`.
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            debug!(
                "Ignoring status change {:?} → {:?} for {}",
                self.status, next, self.source
            );
            false
        }
    }

    pub(crate) fn finish(&mut self, bands: usize) -> bool {
        let moved = self.transition(TaskStatus::Finished);
        if moved {
            self.bands = bands;
        }
        moved
    }

    pub(crate) fn fail(&mut self, error: TaskError) -> bool {
        let moved = self.transition(TaskStatus::Failed);
        if moved {
            self.error = Some(error);
        }
        moved
    }

    /// Serializable view of this task at position `index`.
    pub fn snapshot(&self, index: usize) -> TaskSnapshot {
        TaskSnapshot {
            index,
            status: self.status,
            kind: self.kind(),
            source: self.source.to_string(),
            begin: self.begin,
            end: self.end,
            bands: self.bands,
            error: self.error.clone(),
        }
    }
}

/// Point-in-time copy of a task, for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub index: usize,
    pub status: TaskStatus,
    pub kind: LinkKind,
    pub source: String,
    pub begin: usize,
    pub end: usize,
    pub bands: usize,
    pub error: Option<TaskError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_task() -> Task {
        Task::new(
            DocumentId::next(),
            3,
            22,
            ImageSource::Local(PathBuf::from("/tmp/a.png")),
        )
    }

    #[test]
    fn status_moves_forward_only() {
        let mut t = local_task();
        assert_eq!(t.status(), TaskStatus::Init);
        assert!(!t.transition(TaskStatus::Finished));
        assert!(t.transition(TaskStatus::Start));
        assert!(!t.transition(TaskStatus::Init));
        assert!(t.finish(4));
        assert!(!t.transition(TaskStatus::Start));
        assert!(!t.fail(TaskError::Render { detail: "x".into() }));
        assert_eq!(t.status(), TaskStatus::Finished);
        assert_eq!(t.bands(), 4);
        assert!(t.error().is_none());
    }

    #[test]
    fn max_rows_is_half_the_span() {
        let t = local_task();
        assert_eq!(t.max_rows(), 9);
    }

    #[test]
    fn snapshot_serialises_lowercase() {
        let mut t = local_task();
        t.transition(TaskStatus::Start);
        let json = serde_json::to_string(&t.snapshot(0)).unwrap();
        assert!(json.contains("\"status\":\"start\""), "got: {json}");
        assert!(json.contains("\"kind\":\"local\""), "got: {json}");
    }

    #[test]
    fn remote_source_display() {
        let url = Url::parse("https://x.invalid/a b.jpg").unwrap();
        let src = ImageSource::Remote(url);
        assert_eq!(src.kind(), LinkKind::Remote);
        assert_eq!(src.to_string(), "https://x.invalid/a%20b.jpg");
    }
}
