//! Error types for the sliced-images library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SliceError`] — **Fatal** for the call that returned it: the document
//!   was dropped, a span is out of range, the configuration is invalid.
//!   Returned as `Err(SliceError)` from lifecycle and document operations.
//!
//! * [`TaskError`] — **Non-fatal**: one image link failed (download error,
//!   undecodable file) but every other link keeps rendering. Stored on the
//!   [`crate::task::Task`] so callers can inspect partial success, and the
//!   failed link's original text stays visible in the document.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors returned by the sliced-images library.
///
/// Per-link failures use [`TaskError`] and never surface here.
#[derive(Debug, Error)]
pub enum SliceError {
    // ── Document errors ───────────────────────────────────────────────────
    /// The document owning the scheduler no longer exists.
    #[error("Document was dropped while rendering was enabled")]
    DocumentDropped,

    /// A placeholder was requested outside the document text.
    #[error("Invalid span {begin}..{end} (document has {len} characters)")]
    InvalidSpan { begin: usize, end: usize, len: usize },

    /// The document file could not be read.
    #[error("Failed to read document '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an export file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image link.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum TaskError {
    /// The link could not be turned into a fetchable source.
    #[error("Link '{link}' skipped: {reason}")]
    Discovery { link: String, reason: String },

    /// Download failed (HTTP status, network error, non-zero curl exit).
    #[error("Failed to fetch '{source_ref}': {reason}")]
    Fetch { source_ref: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Fetching '{source_ref}' timed out after {secs}s")]
    FetchTimeout { source_ref: String, secs: u64 },

    /// The fetched file is missing, unreadable or not a supported image.
    #[error("Failed to decode '{path}': {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Placeholders could not be written into the document.
    #[error("Render failed: {detail}")]
    Render { detail: String },
}

impl From<SliceError> for TaskError {
    fn from(e: SliceError) -> Self {
        TaskError::Render {
            detail: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_span_display() {
        let e = SliceError::InvalidSpan {
            begin: 4,
            end: 12,
            len: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("4..12"), "got: {msg}");
        assert!(msg.contains("10 characters"), "got: {msg}");
    }

    #[test]
    fn fetch_timeout_display() {
        let e = TaskError::FetchTimeout {
            source_ref: "https://example.invalid/a.png".into(),
            secs: 30,
        };
        assert!(e.to_string().contains("30s"));
        assert!(e.to_string().contains("example.invalid"));
    }

    #[test]
    fn slice_error_converts_to_render_task_error() {
        let e: TaskError = SliceError::DocumentDropped.into();
        match e {
            TaskError::Render { detail } => assert!(detail.contains("dropped")),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn task_error_round_trips_through_json() {
        let e = TaskError::Decode {
            path: PathBuf::from("/tmp/broken.png"),
            reason: "unexpected EOF".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: TaskError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
