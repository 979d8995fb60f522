//! # sliced-images
//!
//! Show images inline in a text document as a stack of horizontal bands, one
//! band per text line, so a tall image scrolls line by line with the text
//! around it instead of jumping as a single block.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Scan     find [[...]] links naming an image, one Init task each
//!  ├─ 2. Tick     start up to N tasks at a time (default 20), blank their span
//!  ├─ 3. Fetch    local path as-is, URLs downloaded to a temp file
//!  ├─ 4. Decode   spawn_blocking, cap the display width (default 700 px)
//!  ├─ 5. Slice    cut into ⌊span / 2⌋ bands at most, one per line height
//!  └─ 6. Render   band + line-break placeholders over the link text
//! ```
//!
//! Tasks move `Init → Start → Finished` and never go back. A link whose
//! fetch or decode fails ends `Failed`; its original text is shown again and
//! its slot goes to the next waiting link.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sliced_images::{enable, RenderConfig, TextDocument};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let doc = TextDocument::open("notes.org").await?.into_shared();
//!     let mut session = enable(&doc, RenderConfig::default())?;
//!     session.wait_settled(Duration::from_secs(60)).await;
//!     for task in session.snapshot() {
//!         eprintln!("{:?} {} ({} bands)", task.status, task.source, task.bands);
//!     }
//!     session.disable();
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `sliced-images` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! sliced-images = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod markup;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
pub mod session;
pub mod task;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{FetchBackend, RenderConfig, RenderConfigBuilder};
pub use document::{
    Document, DocumentId, Payload, Placeholder, PlaceholderId, SharedDocument, TextDocument,
};
pub use error::{SliceError, TaskError};
pub use export::{to_html, write_html};
pub use pipeline::decode::ImageHandle;
pub use pipeline::fetch::{FetchedImage, Fetcher, ImageFetcher};
pub use pipeline::slice::{slice, Crop};
pub use progress::{NoopProgressCallback, ProgressCallback, RenderProgressCallback};
pub use scheduler::{Scheduler, TickReport};
pub use session::{enable, RenderSession};
pub use task::{ImageSource, LinkKind, Task, TaskSnapshot, TaskStatus};
