//! Pipeline stages for turning image links into placeholder bands.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested without a running scheduler.
//!
//! ## Data Flow
//!
//! ```text
//! scan ──▶ fetch ──▶ decode ──▶ slice ──▶ render ──▶ encode
//! (links)  (file/URL) (image)   (crops)   (overlays) (export only)
//! ```
//!
//! 1. [`scan`]   — find eligible links and resolve them to an image source
//! 2. [`fetch`]  — normalise the source to a local file; remote URLs are
//!    downloaded to a temp file over HTTP or with `curl`
//! 3. [`decode`] — read pixels in `spawn_blocking` and cap the display width
//! 4. [`slice`]  — cut the displayed image into equal horizontal crops
//! 5. [`render`] — lay band and line-break placeholders over the link span
//! 6. [`encode`] — PNG + base64 one band, used when exporting a preview

pub mod decode;
pub mod encode;
pub mod fetch;
pub mod render;
pub mod scan;
pub mod slice;
