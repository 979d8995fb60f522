//! Progress-callback trait for per-link rendering events.
//!
//! Inject an [`Arc<dyn RenderProgressCallback>`] via
//! [`crate::config::RenderConfigBuilder::progress_callback`] to receive events
//! as the scheduler advances each image link.
//!
//! # Example
//!
//! ```rust
//! use sliced_images::{RenderConfig, RenderProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl RenderProgressCallback for CountingCallback {
//!     fn on_task_finished(&self, index: usize, total: usize, bands: usize) {
//!         self.finished.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("link {}/{} → {} bands", index + 1, total, bands);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { finished: AtomicUsize::new(0) });
//! let config = RenderConfig::builder()
//!     .progress_callback(cb as Arc<dyn RenderProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the scheduler as it processes each image link.
///
/// Callbacks run on the coordinating task while the scheduler is locked, so
/// implementations should return quickly. All methods default to no-ops.
pub trait RenderProgressCallback: Send + Sync {
    /// Called after a scan pass with the number of eligible links.
    fn on_scan_complete(&self, total: usize) {
        let _ = total;
    }

    /// Called when a link moves from `Init` to `Start`.
    ///
    /// # Arguments
    /// * `index`  — 0-indexed position in document order
    /// * `total`  — number of links in the current scan
    /// * `source` — resolved path or URL
    fn on_task_start(&self, index: usize, total: usize, source: &str) {
        let _ = (index, total, source);
    }

    /// Called when a link's bands have been placed.
    fn on_task_finished(&self, index: usize, total: usize, bands: usize) {
        let _ = (index, total, bands);
    }

    /// Called when a link fails; its original text stays visible.
    fn on_task_failed(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RenderProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RenderConfig`].
pub type ProgressCallback = Arc<dyn RenderProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        scanned: AtomicUsize,
        starts: AtomicUsize,
        finished: AtomicUsize,
        failed: AtomicUsize,
    }

    impl RenderProgressCallback for TrackingCallback {
        fn on_scan_complete(&self, total: usize) {
            self.scanned.store(total, Ordering::SeqCst);
        }

        fn on_task_start(&self, _index: usize, _total: usize, _source: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_task_finished(&self, _index: usize, _total: usize, _bands: usize) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }

        fn on_task_failed(&self, _index: usize, _total: usize, _error: &str) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_scan_complete(3);
        cb.on_task_start(0, 3, "/tmp/a.png");
        cb.on_task_finished(0, 3, 4);
        cb.on_task_failed(1, 3, "decode error");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_scan_complete(2);
        tracker.on_task_start(0, 2, "a");
        tracker.on_task_start(1, 2, "b");
        tracker.on_task_finished(0, 2, 3);
        tracker.on_task_failed(1, 2, "HTTP 404");

        assert_eq!(tracker.scanned.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.finished.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.failed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_task_start(0, 1, "x");
    }
}
