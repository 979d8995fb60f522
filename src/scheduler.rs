//! Per-document task registry and its tick.
//!
//! ## Why a channel for completions?
//!
//! Fetch and decode run as independent spawned tasks, but task state and
//! document placeholders must only change in one place. Each spawned task
//! sends a [`Completion`] back; the session's coordinating loop applies it
//! with [`Scheduler::complete`] on the same task that runs [`Scheduler::tick`].
//!
//! Completions are tagged with the scan generation. Rescanning or clearing
//! bumps the generation, so results of fetches started before that point are
//! dropped instead of writing into a task list that no longer exists.

use crate::config::RenderConfig;
use crate::document::{Document, DocumentId, PlaceholderId, SharedDocument};
use crate::error::{SliceError, TaskError};
use crate::pipeline::decode::{self, ImageHandle};
use crate::pipeline::fetch::Fetcher;
use crate::pipeline::{render, scan};
use crate::task::{Task, TaskSnapshot, TaskStatus};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Result of one fetch + decode, addressed to a task.
#[derive(Debug)]
pub struct Completion {
    generation: u64,
    document: DocumentId,
    index: usize,
    result: Result<ImageHandle, TaskError>,
}

pub type CompletionSender = mpsc::UnboundedSender<Completion>;
pub type CompletionReceiver = mpsc::UnboundedReceiver<Completion>;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tasks moved from `Init` to `Start` by this tick.
    pub started: usize,
    /// Tasks in `Start` once the tick returned.
    pub in_flight: usize,
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Task list, placeholder set and concurrency cap for one document.
pub struct Scheduler<D: Document> {
    document: Weak<Mutex<D>>,
    document_id: DocumentId,
    config: RenderConfig,
    fetcher: Arc<dyn Fetcher>,
    tasks: Vec<Task>,
    placeholders: HashSet<PlaceholderId>,
    generation: u64,
    completions: CompletionSender,
}

impl<D: Document> Scheduler<D> {
    /// Create an empty scheduler; call [`scan`](Self::scan) to populate it.
    pub fn new(
        document: &SharedDocument<D>,
        config: RenderConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, CompletionReceiver) {
        let document_id = lock(document).id();
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            document: Arc::downgrade(document),
            document_id,
            config,
            fetcher,
            tasks: Vec::new(),
            placeholders: HashSet::new(),
            generation: 0,
            completions: tx,
        };
        (scheduler, rx)
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Number of live placeholders this scheduler has written.
    pub fn placeholder_count(&self) -> usize {
        self.placeholders.len()
    }

    /// Serializable copy of every task.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(i, t)| t.snapshot(i))
            .collect()
    }

    /// No task is waiting or in flight.
    pub fn is_settled(&self) -> bool {
        self.tasks.iter().all(|t| t.status().is_terminal())
    }

    /// Discard the task list and rebuild it from the document.
    ///
    /// Placeholders from the previous pass are released first and in-flight
    /// fetches from it are disowned.
    pub fn scan(&mut self) -> Result<usize, SliceError> {
        let document = self.document.upgrade().ok_or(SliceError::DocumentDropped)?;
        let mut document = lock(&document);

        self.release_placeholders(&mut *document);
        self.generation += 1;
        self.tasks = scan::scan(&*document);

        let total = self.tasks.len();
        if let Some(cb) = &self.config.progress_callback {
            cb.on_scan_complete(total);
        }
        Ok(total)
    }

    /// Start `Init` tasks in document order until the cap is reached.
    ///
    /// Tasks started earlier in the same tick count toward the cap.
    pub fn tick(&mut self) -> Result<TickReport, SliceError> {
        if self.document.strong_count() == 0 {
            return Err(SliceError::DocumentDropped);
        }
        let cap = self.config.max_concurrent_inflight;
        let mut in_flight = self
            .tasks
            .iter()
            .filter(|t| t.status() == TaskStatus::Start)
            .count();

        let mut report = TickReport {
            started: 0,
            in_flight,
        };
        if in_flight >= cap || !self.tasks.iter().any(|t| t.status() == TaskStatus::Init) {
            return Ok(report);
        }

        let document = self.document.upgrade().ok_or(SliceError::DocumentDropped)?;
        let mut document = lock(&document);

        for index in 0..self.tasks.len() {
            if in_flight >= cap {
                break;
            }
            if self.tasks[index].status() != TaskStatus::Init {
                continue;
            }
            if self.start(&mut *document, index) {
                in_flight += 1;
                report.started += 1;
            }
        }

        report.in_flight = in_flight;
        if report.started > 0 {
            debug!(
                "Tick started {} tasks ({} in flight, cap {})",
                report.started, in_flight, cap
            );
        }
        Ok(report)
    }

    /// Blank the task's span, mark it `Start` and spawn its fetch + decode.
    ///
    /// Must be called from within a tokio runtime. Returns `false` when the
    /// span could not be blanked; the task is then `Failed`.
    fn start(&mut self, document: &mut D, index: usize) -> bool {
        let total = self.tasks.len();
        let task = &mut self.tasks[index];

        match render::blank(document, task.begin(), task.end()) {
            Ok(id) => {
                task.blank = Some(id);
                self.placeholders.insert(id);
            }
            Err(e) => {
                let error = TaskError::from(e);
                warn!("Cannot blank link {}: {}", task.source(), error);
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_task_failed(index, total, &error.to_string());
                }
                task.fail(error);
                return false;
            }
        }

        task.transition(TaskStatus::Start);
        if let Some(cb) = &self.config.progress_callback {
            cb.on_task_start(index, total, &task.source().to_string());
        }

        let fetch = self.fetcher.fetch(task.source());
        let tx = self.completions.clone();
        let generation = self.generation;
        let document_id = self.document_id;
        let max_width = self.config.max_display_width;

        tokio::spawn(async move {
            let result = match fetch.await {
                Ok(fetched) => decode::load(fetched, max_width).await,
                Err(e) => Err(e),
            };
            // Send fails once the session is gone; nothing left to update.
            let _ = tx.send(Completion {
                generation,
                document: document_id,
                index,
                result,
            });
        });
        true
    }

    /// Apply a finished fetch + decode to its task.
    ///
    /// Returns `false` when the completion was stale and ignored.
    pub fn complete(&mut self, completion: Completion) -> bool {
        let Completion {
            generation,
            document: document_id,
            index,
            result,
        } = completion;

        if generation != self.generation || document_id != self.document_id {
            debug!(
                "Ignoring stale completion for task {} (generation {} != {})",
                index, generation, self.generation
            );
            return false;
        }
        let total = self.tasks.len();
        let Some(task) = self.tasks.get_mut(index) else {
            return false;
        };
        if task.status() != TaskStatus::Start {
            return false;
        }
        let Some(document) = self.document.upgrade() else {
            debug!("Document dropped before task {} completed", index);
            return false;
        };
        let mut document = lock(&document);
        if document.id() != self.document_id {
            return false;
        }

        if let Some(id) = task.blank.take() {
            document.release_placeholder(id);
            self.placeholders.remove(&id);
        }

        let band_height = self.config.band_height();
        let outcome = result.and_then(|image| {
            render::place_bands(&mut *document, task.begin(), task.end(), &image, band_height)
                .map_err(TaskError::from)
        });

        match outcome {
            Ok(placement) => {
                self.placeholders.extend(placement.placeholders.iter().copied());
                task.finish(placement.bands);
                info!(
                    "Rendered {} as {} bands ({}/{})",
                    task.source(),
                    placement.bands,
                    index + 1,
                    total
                );
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_task_finished(index, total, placement.bands);
                }
            }
            Err(e) => {
                warn!("Image link {} failed: {}", task.source(), e);
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_task_failed(index, total, &e.to_string());
                }
                task.fail(e);
            }
        }
        true
    }

    /// Drop every task and release every placeholder.
    pub fn clear(&mut self) {
        match self.document.upgrade() {
            Some(document) => {
                let mut document = lock(&document);
                self.release_placeholders(&mut *document);
            }
            None => self.placeholders.clear(),
        }
        self.tasks.clear();
        self.generation += 1;
    }

    /// Replace the completion channel, returning the new receiver.
    ///
    /// Fetches started on the old channel can no longer report back.
    pub fn reconnect(&mut self) -> CompletionReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.completions = tx;
        self.generation += 1;
        rx
    }

    fn release_placeholders(&mut self, document: &mut D) {
        let released = self.placeholders.len();
        for id in self.placeholders.drain() {
            document.release_placeholder(id);
        }
        for task in &mut self.tasks {
            task.blank = None;
        }
        if released > 0 {
            debug!("Released {} placeholders", released);
        }
    }
}
