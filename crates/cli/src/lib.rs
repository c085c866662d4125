use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use leafview_cache::BitmapCache;
use leafview_core::{
    Bitmap, ControllerId, DecodeError, DecodeHandle, DecodeRequest, DecodeService,
    DocumentController, LayoutChange, PageId, PageRef, PageView, Rect, RectF, SharedSnapshot,
    TouchEvent, ViewerConfig,
};
use leafview_render::{DrawOutcome, RecordingCanvas};
use leafview_ui::SurfaceController;
use serde::Serialize;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound for any single wait in a simulated session
const STEP_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "leafview-cli")]
#[command(about = "Leafview headless viewer driver")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a scripted scroll-and-draw session and print a JSON report.
    Simulate(SimulateArgs),
    /// Print the effective viewer configuration as JSON.
    Config {
        /// Read this file instead of the default location.
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct SimulateArgs {
    /// Number of pages in the synthetic document.
    #[arg(long, default_value_t = 12)]
    pages: u32,
    /// Surface width in pixels.
    #[arg(long, default_value_t = 600)]
    width: i32,
    /// Surface height in pixels.
    #[arg(long, default_value_t = 1000)]
    height: i32,
    /// Number of scroll steps after the initial frame.
    #[arg(long, default_value_t = 8)]
    steps: u32,
    /// Vertical distance of each scroll step in pixels.
    #[arg(long, default_value_t = 400)]
    step_px: i32,
    /// Page whose decode always fails (0-based, repeatable).
    #[arg(long = "fail-page", value_name = "PAGE")]
    fail_pages: Vec<u32>,
    /// Page whose decode panics (0-based, repeatable).
    #[arg(long = "panic-page", value_name = "PAGE")]
    panic_pages: Vec<u32>,
    /// Viewer configuration file; defaults plus environment otherwise.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SimulateOutput {
    frames: u32,
    complete_frames: u32,
    fallback_frames: u32,
    placeholders: usize,
    pages_drawn: usize,
    final_scroll: ScrollOutput,
    degraded: bool,
    decode_calls: u64,
    scheduler: SchedulerOutput,
    scroll: ScrollStatsOutput,
    pool: PoolOutput,
    cache: CacheOutput,
}

#[derive(Debug, Serialize)]
struct ScrollOutput {
    x: i32,
    y: i32,
}

#[derive(Debug, Serialize)]
struct SchedulerOutput {
    submitted: u64,
    coalesced: u64,
    stale_rejected: u64,
    iterations: u64,
    faults: u64,
    frames_published: u64,
    synthesized: u64,
}

#[derive(Debug, Serialize)]
struct ScrollStatsOutput {
    requests: u64,
    applied: u64,
    emitted: u64,
}

#[derive(Debug, Serialize)]
struct PoolOutput {
    capacity: usize,
    acquisitions: u64,
    temporaries: u64,
}

#[derive(Debug, Serialize)]
struct CacheOutput {
    entries: usize,
    memory_used: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Simulate(args) => run_simulate(&args),
        Commands::Config { file } => run_config(file.as_deref()),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(file: Option<&Path>) -> Result<ViewerConfig> {
    match file {
        Some(path) => {
            ensure_file_exists(path)?;
            ViewerConfig::from_file(path)
                .and_then(ViewerConfig::apply_env)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => ViewerConfig::load().context("failed to load config"),
    }
}

fn run_config(file: Option<&Path>) -> Result<()> {
    let config = load_config(file)?;
    let json = serde_json::to_string_pretty(&config)?;
    println!("{json}");
    Ok(())
}

fn run_simulate(args: &SimulateArgs) -> Result<()> {
    if args.pages == 0 {
        anyhow::bail!("--pages must be >= 1");
    }
    if args.width <= 0 || args.height <= 0 {
        anyhow::bail!("--width and --height must be positive");
    }

    let config = match &args.config {
        Some(path) => load_config(Some(path))?,
        None => ViewerConfig::from_env().context("failed to read environment overrides")?,
    };

    let document = Arc::new(StripDocument::new(args.pages, args.height));
    let decoder = Arc::new(SyntheticDecoder::new(&args.fail_pages, &args.panic_pages));
    let cache = Arc::new(BitmapCache::from_config(&config.cache));
    let surface = SurfaceController::new(document.clone(), decoder.clone(), cache, config, None)
        .context("failed to start viewer surface")?;

    surface.on_layout(true, Rect::from_size(args.width, args.height));
    if !surface.wait_for_initialization_timeout(STEP_DEADLINE) {
        anyhow::bail!("surface did not finish its first layout");
    }

    let mut tally = Tally::default();
    for step in 0..=args.steps {
        let target = step as i32 * args.step_px;
        let (x, y) = document.scroll_limits().clamp_point(0, target);
        surface.scroll_to(x, y);
        wait_for(|| (surface.scroll_x(), surface.scroll_y()) == (x, y))
            .with_context(|| format!("scroll to ({x}, {y}) did not settle"))?;

        let published = surface.scheduler_stats().frames_published;
        surface.redraw_view();
        wait_for(|| surface.scheduler_stats().frames_published > published)
            .with_context(|| format!("no frame was prepared for step {step}"))?;

        let mut canvas = RecordingCanvas::new();
        tally.record(surface.on_draw(&mut canvas));
    }

    let report = SimulateOutput {
        frames: tally.frames,
        complete_frames: tally.complete,
        fallback_frames: tally.fallback,
        placeholders: tally.placeholders,
        pages_drawn: tally.pages,
        final_scroll: ScrollOutput { x: surface.scroll_x(), y: surface.scroll_y() },
        degraded: surface.is_render_degraded(),
        decode_calls: decoder.calls(),
        scheduler: {
            let stats = surface.scheduler_stats();
            SchedulerOutput {
                submitted: stats.submitted,
                coalesced: stats.coalesced,
                stale_rejected: stats.stale_rejected,
                iterations: stats.iterations,
                faults: stats.faults,
                frames_published: stats.frames_published,
                synthesized: stats.synthesized,
            }
        },
        scroll: {
            let stats = surface.scroll_stats();
            ScrollStatsOutput {
                requests: stats.requests,
                applied: stats.applied,
                emitted: stats.emitted,
            }
        },
        pool: {
            let stats = surface.pool_stats();
            PoolOutput {
                capacity: stats.capacity,
                acquisitions: stats.acquisitions,
                temporaries: stats.temporaries,
            }
        },
        cache: {
            let stats = surface.cache().stats();
            CacheOutput {
                entries: stats.entry_count,
                memory_used: stats.memory_used,
                hits: stats.hits,
                misses: stats.misses,
                evictions: stats.evictions,
            }
        },
    };

    surface.join();

    let json = serde_json::to_string_pretty(&report)?;
    println!("{json}");
    Ok(())
}

#[derive(Debug, Default)]
struct Tally {
    frames: u32,
    complete: u32,
    fallback: u32,
    placeholders: usize,
    pages: usize,
}

impl Tally {
    fn record(&mut self, outcome: DrawOutcome) {
        self.frames += 1;
        match outcome {
            DrawOutcome::Complete { pages } => {
                self.complete += 1;
                self.pages += pages;
            }
            DrawOutcome::Fallback { pages, placeholders } => {
                self.fallback += 1;
                self.pages += pages;
                self.placeholders += placeholders;
            }
            DrawOutcome::Skipped => {}
        }
    }
}

fn wait_for(condition: impl Fn() -> bool) -> Result<()> {
    let deadline = Instant::now() + STEP_DEADLINE;
    while !condition() {
        if Instant::now() >= deadline {
            anyhow::bail!("timed out after {STEP_DEADLINE:?}");
        }
        thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

/// Page width of the synthetic document at zoom 1
const PAGE_WIDTH: f32 = 600.0;
/// Page height of the synthetic document at zoom 1
const PAGE_HEIGHT: f32 = 800.0;

/// Vertical strip of equally sized pages that ignores touch input
struct StripDocument {
    pages: u32,
    view_height: i32,
}

impl StripDocument {
    fn new(pages: u32, view_height: i32) -> Self {
        Self { pages, view_height }
    }

    fn page_bounds(&self, index: u32) -> RectF {
        RectF::new(0.0, index as f32 * PAGE_HEIGHT, PAGE_WIDTH, (index + 1) as f32 * PAGE_HEIGHT)
    }
}

impl DocumentController for StripDocument {
    fn id(&self) -> ControllerId {
        ControllerId(1)
    }

    fn on_touch_event(&self, _event: &TouchEvent) -> bool {
        false
    }

    fn on_layout_changed(&self, _change: LayoutChange) {}

    fn on_scroll_changed(&self, _cur_x: i32, _cur_y: i32, _old_x: i32, _old_y: i32) {}

    fn current_page(&self) -> Option<PageRef> {
        Some(PageRef::new(PageId(0), self.page_bounds(0)))
    }

    fn zoom(&self) -> f32 {
        1.0
    }

    fn visible_pages(&self, view_rect: &RectF) -> Vec<PageView> {
        (0..self.pages)
            .map(|index| PageView { page: PageId(index), bounds: self.page_bounds(index) })
            .filter(|page| page.bounds.intersects(view_rect))
            .collect()
    }

    fn scroll_limits(&self) -> Rect {
        let document_height = (self.pages as f32 * PAGE_HEIGHT) as i32;
        Rect::new(0, 0, 0, (document_height - self.view_height).max(0))
    }
}

/// Produces small solid bitmaps synchronously, with scripted failures
struct SyntheticDecoder {
    failing: HashSet<PageId>,
    panicking: HashSet<PageId>,
    calls: AtomicU64,
}

impl SyntheticDecoder {
    fn new(failing: &[u32], panicking: &[u32]) -> Self {
        Self {
            failing: failing.iter().copied().map(PageId).collect(),
            panicking: panicking.iter().copied().map(PageId).collect(),
            calls: AtomicU64::new(0),
        }
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl DecodeService for SyntheticDecoder {
    fn decode(&self, request: DecodeRequest) -> DecodeHandle {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.panicking.contains(&request.page) {
            panic!("synthetic decoder crashed on page {}", request.page);
        }
        if self.failing.contains(&request.page) {
            return DecodeHandle::ready(
                request.page,
                Err(DecodeError::Failed { page: request.page, reason: "scripted failure".into() }),
            );
        }

        // One pixel per 8x8 block keeps the cache small
        let width = (request.bounds_at_zoom.width() / 8.0).ceil().max(1.0) as u32;
        let height = (request.bounds_at_zoom.height() / 8.0).ceil().max(1.0) as u32;
        let shade = if request.invert { 0 } else { 255 };
        DecodeHandle::ready(
            request.page,
            Ok(Arc::new(Bitmap::filled(width, height, [shade, shade, shade, 255]))),
        )
    }

    fn update_view_state(&self, _snapshot: &SharedSnapshot) {}
}
