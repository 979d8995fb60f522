//! Configuration types for inline image slicing.
//!
//! All rendering behaviour is controlled through [`RenderConfig`], built via
//! its [`RenderConfigBuilder`]. One struct for every knob keeps configs cheap
//! to clone into spawned fetch tasks and easy to log.

use crate::error::SliceError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration for rendering image links in a document.
///
/// Built via [`RenderConfig::builder()`] or using [`RenderConfig::default()`].
///
/// # Example
/// ```rust
/// use sliced_images::RenderConfig;
///
/// let config = RenderConfig::builder()
///     .max_display_width(900)
///     .max_concurrent_inflight(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.band_height(), 40);
/// ```
#[derive(Clone)]
pub struct RenderConfig {
    /// Maximum display width of an image in pixels. Default: 700.
    ///
    /// Wider images are scaled down proportionally; the scaled height is what
    /// the slicer divides into bands. Narrower images keep their own width.
    pub max_display_width: u32,

    /// Maximum number of links fetched and rendered at once. Default: 20.
    pub max_concurrent_inflight: usize,

    /// Period of the scheduler tick. Default: 500 ms.
    pub tick_period: Duration,

    /// Pixel height of one text line in the host display. Default: 20.
    ///
    /// One band covers two lines (image line + line break), so the band
    /// height is twice this value.
    pub line_pixel_height: u32,

    /// How remote images are downloaded. Default: [`FetchBackend::Http`].
    pub fetch_backend: FetchBackend,

    /// Download timeout for remote images in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_display_width: 700,
            max_concurrent_inflight: 20,
            tick_period: Duration::from_millis(500),
            line_pixel_height: 20,
            fetch_backend: FetchBackend::default(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderConfig")
            .field("max_display_width", &self.max_display_width)
            .field("max_concurrent_inflight", &self.max_concurrent_inflight)
            .field("tick_period", &self.tick_period)
            .field("line_pixel_height", &self.line_pixel_height)
            .field("fetch_backend", &self.fetch_backend)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn RenderProgressCallback>"),
            )
            .finish()
    }
}

impl RenderConfig {
    /// Create a new builder for `RenderConfig`.
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: Self::default(),
        }
    }

    /// Pixel height of one band: two text lines.
    pub fn band_height(&self) -> u32 {
        self.line_pixel_height.saturating_mul(2)
    }
}

/// Builder for [`RenderConfig`].
#[derive(Debug)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    pub fn max_display_width(mut self, px: u32) -> Self {
        self.config.max_display_width = px;
        self
    }

    pub fn max_concurrent_inflight(mut self, n: usize) -> Self {
        self.config.max_concurrent_inflight = n.max(1);
        self
    }

    pub fn tick_period(mut self, period: Duration) -> Self {
        self.config.tick_period = period;
        self
    }

    pub fn line_pixel_height(mut self, px: u32) -> Self {
        self.config.line_pixel_height = px;
        self
    }

    pub fn fetch_backend(mut self, backend: FetchBackend) -> Self {
        self.config.fetch_backend = backend;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RenderConfig, SliceError> {
        let c = &self.config;
        if c.max_display_width == 0 {
            return Err(SliceError::InvalidConfig(
                "Maximum display width must be ≥ 1 px".into(),
            ));
        }
        if c.line_pixel_height == 0 {
            return Err(SliceError::InvalidConfig(
                "Line pixel height must be ≥ 1 px".into(),
            ));
        }
        if c.tick_period.is_zero() {
            return Err(SliceError::InvalidConfig(
                "Tick period must be non-zero".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Transport used to download remote images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FetchBackend {
    /// In-process HTTP client (reqwest + rustls). (default)
    #[default]
    Http,
    /// External `curl` subprocess writing straight to the temporary file.
    Curl,
}
