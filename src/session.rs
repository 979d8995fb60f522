//! Lifecycle commands: enable and disable rendering on one document.
//!
//! A [`RenderSession`] owns the document's [`Scheduler`] and one coordinating
//! tokio task. That task is the only writer of scheduler state while the
//! session runs: it ticks on a fixed period and applies fetch completions as
//! they arrive.
//!
//! ```text
//!   interval ──tick──▶ ┌──────────────┐ ──spawn──▶ fetch + decode
//!                      │ coordinator  │                 │
//!   completions ─────▶ └──────────────┘ ◀──Completion───┘
//! ```

use crate::config::RenderConfig;
use crate::document::{Document, SharedDocument};
use crate::error::SliceError;
use crate::pipeline::fetch::{Fetcher, ImageFetcher};
use crate::scheduler::{lock, CompletionReceiver, Scheduler};
use crate::task::TaskSnapshot;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Rendering enabled on one document.
///
/// Dropping the session stops its tick but leaves placed bands in the
/// document; call [`disable`](Self::disable) to remove them.
pub struct RenderSession<D: Document> {
    scheduler: Arc<Mutex<Scheduler<D>>>,
    tick_period: Duration,
    ticker: Option<JoinHandle<()>>,
    completions: Option<CompletionReceiver>,
    settled: Arc<watch::Sender<bool>>,
}

/// Scan `document` and start ticking with the default fetcher.
///
/// Must be called from within a tokio runtime.
pub fn enable<D: Document>(
    document: &SharedDocument<D>,
    config: RenderConfig,
) -> Result<RenderSession<D>, SliceError> {
    let fetcher = Arc::new(ImageFetcher::new(&config)?);
    RenderSession::with_fetcher(document, config, fetcher)
}

impl<D: Document> RenderSession<D> {
    /// Like [`enable`], with a caller-supplied fetcher.
    pub fn with_fetcher(
        document: &SharedDocument<D>,
        config: RenderConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, SliceError> {
        let tick_period = config.tick_period;
        let (scheduler, completions) = Scheduler::new(document, config, fetcher);
        let (settled, _) = watch::channel(false);

        let mut session = Self {
            scheduler: Arc::new(Mutex::new(scheduler)),
            tick_period,
            ticker: None,
            completions: Some(completions),
            settled: Arc::new(settled),
        };
        session.rescan()?;
        Ok(session)
    }

    /// Rebuild the task list from the document and make sure the tick runs.
    ///
    /// Also re-enables a session after [`disable`](Self::disable).
    pub fn rescan(&mut self) -> Result<usize, SliceError> {
        let (total, settled) = {
            let mut scheduler = lock(&self.scheduler);
            let total = scheduler.scan()?;
            (total, scheduler.is_settled())
        };
        self.settled.send_replace(settled);
        self.ensure_ticking();
        info!("Rendering enabled: {} image links", total);
        Ok(total)
    }

    /// Spawn the coordinating task unless one is already running.
    pub fn ensure_ticking(&mut self) {
        if self.is_ticking() {
            return;
        }
        let completions = match self.completions.take() {
            Some(rx) => rx,
            None => lock(&self.scheduler).reconnect(),
        };
        self.ticker = Some(tokio::spawn(coordinate(
            Arc::clone(&self.scheduler),
            completions,
            self.tick_period,
            Arc::clone(&self.settled),
        )));
        debug!("Tick started (period {:?})", self.tick_period);
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop ticking, drop every task and release every placeholder.
    ///
    /// Safe to call when the session is not ticking. Fetches already in
    /// flight keep running but their results are discarded.
    pub fn disable(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
            debug!("Tick cancelled");
        }
        lock(&self.scheduler).clear();
        self.settled.send_replace(true);
        info!("Rendering disabled");
    }

    /// Current state of every task.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        lock(&self.scheduler).snapshot()
    }

    pub fn is_settled(&self) -> bool {
        lock(&self.scheduler).is_settled()
    }

    /// Wait until every task is `Finished` or `Failed`.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_settled(&self, timeout: Duration) -> bool {
        let mut rx = self.settled.subscribe();
        let wait = rx.wait_for(|settled| *settled);
        let settled = matches!(tokio::time::timeout(timeout, wait).await, Ok(Ok(_)));
        settled
    }
}

impl<D: Document> Drop for RenderSession<D> {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}

/// The coordinating loop: tick on `period`, apply completions as they come.
async fn coordinate<D: Document>(
    scheduler: Arc<Mutex<Scheduler<D>>>,
    mut completions: CompletionReceiver,
    period: Duration,
    settled: Arc<watch::Sender<bool>>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let now_settled = tokio::select! {
            _ = interval.tick() => {
                let mut scheduler = lock(&scheduler);
                if let Err(e) = scheduler.tick() {
                    warn!("Stopping tick: {}", e);
                    break;
                }
                scheduler.is_settled()
            }
            Some(completion) = completions.recv() => {
                let mut scheduler = lock(&scheduler);
                scheduler.complete(completion);
                scheduler.is_settled()
            }
        };
        settled.send_replace(now_settled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextDocument;
    use crate::error::TaskError;
    use crate::pipeline::fetch::FetchFuture;
    use crate::task::{ImageSource, TaskStatus};
    use futures::future::{self, FutureExt};

    struct Broken;

    impl Fetcher for Broken {
        fn fetch(&self, source: &ImageSource) -> FetchFuture {
            future::ready(Err(TaskError::Fetch {
                source_ref: source.to_string(),
                reason: "unreachable".into(),
            }))
            .boxed()
        }
    }

    struct Stalled;

    impl Fetcher for Stalled {
        fn fetch(&self, _source: &ImageSource) -> FetchFuture {
            future::pending().boxed()
        }
    }

    fn fast() -> RenderConfig {
        RenderConfig::builder()
            .tick_period(Duration::from_millis(10))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn failing_links_settle_as_failed() {
        let doc = TextDocument::new("[[https://x.invalid/a.png]] [[https://x.invalid/b.png]]")
            .into_shared();
        let session = RenderSession::with_fetcher(&doc, fast(), Arc::new(Broken)).unwrap();
        assert!(session.wait_settled(Duration::from_secs(10)).await);

        let snap = session.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(snap.iter().all(|t| t.status == TaskStatus::Failed));
        assert_eq!(lock(&doc).placeholder_count(), 0);
    }

    #[tokio::test]
    async fn ticking_is_idempotent() {
        let doc = TextDocument::new("no links here").into_shared();
        let mut session = RenderSession::with_fetcher(&doc, fast(), Arc::new(Broken)).unwrap();
        assert!(session.is_ticking());
        session.ensure_ticking();
        session.ensure_ticking();
        assert!(session.is_ticking());
        assert!(session.wait_settled(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn disable_is_safe_twice() {
        let doc = TextDocument::new("[[https://x.invalid/a.png]]").into_shared();
        let mut session = RenderSession::with_fetcher(&doc, fast(), Arc::new(Broken)).unwrap();
        session.disable();
        assert!(!session.is_ticking());
        session.disable();
        assert!(session.snapshot().is_empty());
        assert_eq!(lock(&doc).placeholder_count(), 0);
    }

    #[tokio::test]
    async fn rescan_reenables_after_disable() {
        let doc = TextDocument::new("[[https://x.invalid/a.png]]").into_shared();
        let mut session = RenderSession::with_fetcher(&doc, fast(), Arc::new(Broken)).unwrap();
        session.disable();
        assert_eq!(session.rescan().unwrap(), 1);
        assert!(session.is_ticking());
        assert!(session.wait_settled(Duration::from_secs(10)).await);
        assert_eq!(session.snapshot()[0].status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn wait_settled_times_out_while_fetches_stall() {
        let doc = TextDocument::new("[[https://x.invalid/a.png]]").into_shared();
        let session = RenderSession::with_fetcher(&doc, fast(), Arc::new(Stalled)).unwrap();
        assert!(!session.wait_settled(Duration::from_millis(100)).await);
        assert!(!session.is_settled());
        assert_eq!(session.snapshot()[0].status, TaskStatus::Start);
    }

}
