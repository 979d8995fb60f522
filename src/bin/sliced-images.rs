//! CLI binary for sliced-images.
//!
//! A thin shim over the library crate: opens a document, enables rendering,
//! waits for every image link to settle and reports the result, optionally
//! writing an HTML preview with the bands in place.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use sliced_images::{
    enable, write_html, FetchBackend, ProgressCallback, RenderConfig, RenderProgressCallback,
    TaskSnapshot, TaskStatus, TextDocument,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per settled link. Links settle in any
/// order, so start times are tracked per task index.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Scanning");
        bar.set_message("Looking for image links…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&index)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl RenderProgressCallback for CliProgressCallback {
    fn on_scan_complete(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Rendering");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total} image links"))
        ));
    }

    fn on_task_start(&self, index: usize, _total: usize, source: &str) {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, Instant::now());
        self.bar.set_message(source.to_string());
    }

    fn on_task_finished(&self, index: usize, total: usize, bands: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} Link {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{bands:>4} bands")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_task_failed(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);

        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Link {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Render every image link and print a report
  sliced-images notes.org

  # Write an HTML preview with the images sliced into bands
  sliced-images notes.org --html notes.html

  # Narrow display, taller bands, fewer parallel downloads
  sliced-images --max-width 480 --line-height 24 --max-inflight 4 notes.org

  # Download with the curl binary instead of the built-in client
  sliced-images --fetch-backend curl notes.org

  # Machine-readable task list
  sliced-images --json notes.org > tasks.json

LINKS:
  Org links whose target mentions png, jpg, jpeg, drawio, svg or webp:
    [[file:./diagram.png]]   [[~/shots/a.jpg][caption]]   [[https://host/b.webp]]
  Relative file links resolve against the document's directory.

ENVIRONMENT VARIABLES:
  RUST_LOG                        Override the log filter (e.g. sliced_images=debug)
  SLICED_IMAGES_MAX_WIDTH         Same as --max-width
  SLICED_IMAGES_MAX_INFLIGHT      Same as --max-inflight
  SLICED_IMAGES_FETCH_BACKEND     Same as --fetch-backend
"#;

/// Render image links in a text document as horizontal bands.
#[derive(Parser, Debug)]
#[command(
    name = "sliced-images",
    version,
    about = "Render image links in a text document as line-sized horizontal bands",
    long_about = "Scan an Org-style document for image links, fetch local and remote images \
with bounded concurrency, and slice each image into bands one text line tall, laid over the \
link text. Reports per-link results and can export an HTML preview.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Text document containing [[...]] image links.
    document: PathBuf,

    /// Write an HTML preview of the rendered document to this file.
    #[arg(long, env = "SLICED_IMAGES_HTML")]
    html: Option<PathBuf>,

    /// Print the task list as JSON instead of a report.
    #[arg(long, env = "SLICED_IMAGES_JSON")]
    json: bool,

    /// Maximum display width of an image in pixels.
    #[arg(long, env = "SLICED_IMAGES_MAX_WIDTH", default_value_t = 700)]
    max_width: u32,

    /// Maximum number of links fetched and decoded at once.
    #[arg(long, env = "SLICED_IMAGES_MAX_INFLIGHT", default_value_t = 20)]
    max_inflight: usize,

    /// Scheduler tick period in milliseconds.
    #[arg(long, env = "SLICED_IMAGES_TICK_MS", default_value_t = 500,
          value_parser = clap::value_parser!(u64).range(1..))]
    tick_ms: u64,

    /// Height of one text line in pixels; each band is two lines tall.
    #[arg(long, env = "SLICED_IMAGES_LINE_HEIGHT", default_value_t = 20,
          value_parser = clap::value_parser!(u32).range(1..))]
    line_height: u32,

    /// How remote images are downloaded.
    #[arg(long, env = "SLICED_IMAGES_FETCH_BACKEND", value_enum, default_value = "http")]
    fetch_backend: BackendArg,

    /// Per-image download timeout in seconds.
    #[arg(long, env = "SLICED_IMAGES_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Give up waiting for links after this many seconds.
    #[arg(long, env = "SLICED_IMAGES_TIMEOUT", default_value_t = 600)]
    timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "SLICED_IMAGES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SLICED_IMAGES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SLICED_IMAGES_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Http,
    Curl,
}

impl From<BackendArg> for FetchBackend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Http => FetchBackend::Http,
            BackendArg::Curl => FetchBackend::Curl,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn RenderProgressCallback>),
    )?;

    // ── Render ───────────────────────────────────────────────────────────
    let started = Instant::now();
    let document = TextDocument::open(&cli.document)
        .await
        .with_context(|| format!("Failed to open {}", cli.document.display()))?
        .into_shared();

    let mut session = enable(&document, config).context("Failed to enable rendering")?;
    let settled = session
        .wait_settled(Duration::from_secs(cli.timeout))
        .await;
    let tasks = session.snapshot();

    if let Some(cb) = &progress {
        cb.finish();
    }

    // ── Output ───────────────────────────────────────────────────────────
    if let Some(ref html_path) = cli.html {
        write_html(&document, html_path)
            .await
            .context("Failed to write HTML preview")?;
    }
    session.disable();

    if cli.json {
        let json = serde_json::to_string_pretty(&tasks).context("Failed to serialise tasks")?;
        println!("{json}");
    } else if !cli.quiet {
        if !show_progress {
            print_report(&tasks);
        }
        print_summary(&tasks, started.elapsed(), cli.html.as_deref());
    }

    if !settled {
        anyhow::bail!(
            "Timed out after {}s with {} links still pending",
            cli.timeout,
            tasks.iter().filter(|t| !t.status.is_terminal()).count()
        );
    }
    Ok(())
}

/// One line per link, for runs without the progress bar.
fn print_report(tasks: &[TaskSnapshot]) {
    for t in tasks {
        match t.status {
            TaskStatus::Finished => eprintln!(
                "  {} {}  {}",
                green("✓"),
                t.source,
                dim(&format!("{} bands", t.bands))
            ),
            TaskStatus::Failed => eprintln!(
                "  {} {}  {}",
                red("✗"),
                t.source,
                red(&t.error.as_ref().map(|e| e.to_string()).unwrap_or_default())
            ),
            TaskStatus::Init | TaskStatus::Start => {
                eprintln!("  {} {}  {}", cyan("…"), t.source, dim("pending"))
            }
        }
    }
}

fn print_summary(tasks: &[TaskSnapshot], elapsed: Duration, html: Option<&std::path::Path>) {
    let finished = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Finished)
        .count();
    let failed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .count();
    let bands: usize = tasks.iter().map(|t| t.bands).sum();

    let mark = if failed == 0 && finished == tasks.len() {
        green("✔")
    } else if finished == 0 && !tasks.is_empty() {
        red("✘")
    } else {
        cyan("⚠")
    };
    eprintln!(
        "{}  {}/{} images  {} bands  {}ms{}",
        mark,
        finished,
        tasks.len(),
        bands,
        elapsed.as_millis(),
        html.map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default(),
    );
    if failed > 0 {
        eprintln!("   {} links failed", red(&failed.to_string()));
    }
}

/// Map CLI args to `RenderConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<RenderConfig> {
    let mut builder = RenderConfig::builder()
        .max_display_width(cli.max_width)
        .max_concurrent_inflight(cli.max_inflight)
        .tick_period(Duration::from_millis(cli.tick_ms))
        .line_pixel_height(cli.line_height)
        .fetch_backend(cli.fetch_backend.into())
        .download_timeout_secs(cli.download_timeout);
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}
