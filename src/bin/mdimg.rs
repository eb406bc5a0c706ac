//! CLI binary for mdimg-localize.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `LocalizeConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mdimg_localize::{
    inspect, localize, write_document, CompressionConfig, LocalizeConfig,
    LocalizeProgressCallback, ProgressCallback, TargetFormat,
};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ─────────────────────────────────────────────────────

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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ───────────────────────────────────

/// Progress bar plus one log line per image. Images in a batch finish in
/// any order, so start times are keyed by URL.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Scanning");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, url: &str) -> f64 {
        let started = match self.start_times.lock() {
            Ok(mut map) => map.remove(url),
            Err(_) => None,
        };
        started.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0)
    }
}

fn shorten(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}\u{2026}")
    }
}

impl LocalizeProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_assets: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total_assets as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Localizing");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_assets} remote image(s)"))
        ));
    }

    fn on_asset_start(&self, url: &str) {
        if let Ok(mut map) = self.start_times.lock() {
            map.insert(url.to_string(), Instant::now());
        }
        self.bar.set_message(shorten(url, 60));
    }

    fn on_asset_complete(&self, url: &str, local_link: &str) {
        let secs = self.elapsed_secs(url);
        self.bar.println(format!(
            "  {} {}  →  {}  {}",
            green("✓"),
            shorten(url, 60),
            local_link,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_asset_error(&self, url: &str, error: &str) {
        let secs = self.elapsed_secs(url);
        self.bar.println(format!(
            "  {} {}  {}  {}",
            red("✗"),
            shorten(url, 60),
            red(&shorten(error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_assets: usize, localized: usize) {
        self.bar.finish_and_clear();
        let failed = total_assets.saturating_sub(localized);
        if failed == 0 {
            eprintln!("{} {} image(s) localized", green("✔"), bold(&localized.to_string()));
        } else {
            eprintln!(
                "{} {}/{} image(s) localized  ({} kept remote)",
                if localized == 0 { red("✘") } else { cyan("⚠") },
                bold(&localized.to_string()),
                total_assets,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Localize a post, print the rewritten document
  mdimg source/_posts/hello.md

  # Rewrite into a new file, images under source/images
  mdimg post.md -o out/post.md --images-dir source/images

  # Convert to WebP, lossy at quality 85
  mdimg post.md -o post.md --convert --quality 85

  # Read from stdin
  cat post.md | mdimg - > post.local.md

  # Show what would be downloaded
  mdimg --dry-run post.md

CONFIG FILE (--config, JSON; every key optional):
  {
    "images_root": "source/images",
    "link_prefix": "/images",
    "concurrency": 3,
    "max_retries": 3,
    "timeout_ms": 30000,
    "compression": { "convert_to_target_format": true, "target_quality": 90 }
  }
  Flags override file values.
"#;

/// Download remote images referenced by a Markdown document and rewrite
/// the references to local paths.
#[derive(Parser, Debug)]
#[command(
    name = "mdimg",
    version,
    about = "Localize remote images referenced by a Markdown document",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown file, or `-` for stdin.
    input: String,

    /// Write the rewritten document here instead of stdout.
    #[arg(short, long, env = "MDIMG_OUTPUT")]
    output: Option<PathBuf>,

    /// JSON configuration file; flags override its values.
    #[arg(long, env = "MDIMG_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory for downloaded images.
    #[arg(long, env = "MDIMG_IMAGES_DIR")]
    images_dir: Option<PathBuf>,

    /// Prefix for links written into the document (default /images).
    #[arg(long, env = "MDIMG_LINK_PREFIX")]
    link_prefix: Option<String>,

    /// Downloads per batch.
    #[arg(short, long, env = "MDIMG_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Attempts per image, redirects included.
    #[arg(long, env = "MDIMG_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Per-request timeout in milliseconds.
    #[arg(long, env = "MDIMG_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Maximum image width in pixels.
    #[arg(long, env = "MDIMG_MAX_WIDTH")]
    max_width: Option<u32>,

    /// Maximum image height in pixels.
    #[arg(long, env = "MDIMG_MAX_HEIGHT")]
    max_height: Option<u32>,

    /// Convert images to the target format.
    #[arg(long, env = "MDIMG_CONVERT")]
    convert: bool,

    /// Target format for --convert: webp or jpeg.
    #[arg(long, env = "MDIMG_TARGET_FORMAT")]
    target_format: Option<TargetFormat>,

    /// Lossy quality (1–100).
    #[arg(long, env = "MDIMG_QUALITY",
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// PNG/GIF sources below this size are converted losslessly.
    #[arg(long, env = "MDIMG_LOSSLESS_THRESHOLD")]
    lossless_threshold: Option<u64>,

    /// Minimum fractional saving required to keep a re-encoded file.
    #[arg(long, env = "MDIMG_MIN_SAVINGS")]
    min_savings: Option<f64>,

    /// Download only; never resize or convert.
    #[arg(long, env = "MDIMG_NO_COMPRESS")]
    no_compress: bool,

    /// Give up on images not yet attempted after this many milliseconds.
    #[arg(long, env = "MDIMG_DEADLINE_MS")]
    deadline_ms: Option<u64>,

    /// List references and their local targets, then exit.
    #[arg(long)]
    dry_run: bool,

    /// Output structured JSON (LocalizeOutput) instead of the document.
    #[arg(long, env = "MDIMG_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MDIMG_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MDIMG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MDIMG_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs when it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.dry_run;
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

    let doc = read_input(&cli.input).await?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn LocalizeProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Dry run ──────────────────────────────────────────────────────────
    if cli.dry_run {
        let refs = inspect(&doc, &config);
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&refs).context("Failed to serialise references")?
            );
        } else {
            for r in &refs {
                println!(
                    "{:<18} {}\n{:<18} → {}",
                    format!("{:?}", r.category),
                    r.original_url,
                    "",
                    r.local_absolute_path.display()
                );
            }
            if !cli.quiet {
                eprintln!("{} reference(s)", refs.len());
            }
        }
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let output = localize(&doc, &config).await.context("Localization failed")?;

    if let Some(ref path) = cli.output {
        write_document(path, &output.document)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if cli.output.is_none() {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.document.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.document.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !cli.json {
        let s = &output.stats;
        if !show_progress {
            eprintln!(
                "Localized {}/{} image(s) in {}ms",
                s.localized, s.total_references, s.duration_ms
            );
            for failed in output.failures() {
                if let Some(ref e) = failed.error {
                    eprintln!("  {} {}", red("✗"), e);
                }
            }
        }
        eprintln!(
            "   {} downloaded  /  {} saved by compression  /  {} already present",
            dim(&format!("{} bytes", s.bytes_downloaded)),
            dim(&format!("{} bytes", s.bytes_saved)),
            dim(&s.skipped_downloads.to_string()),
        );
        if let Some(ref path) = cli.output {
            eprintln!("   →  {}", bold(&path.display().to_string()));
        }
    }

    Ok(())
}

async fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read document from stdin")?;
        Ok(buf)
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read {input}"))
    }
}

/// Map CLI args onto the file config (or defaults).
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<LocalizeConfig> {
    let base = match cli.config {
        Some(ref path) => LocalizeConfig::from_json_file(path)?,
        None => LocalizeConfig::default(),
    };

    let mut compression: CompressionConfig = base.compression.clone();
    if let Some(w) = cli.max_width {
        compression.max_width = w;
    }
    if let Some(h) = cli.max_height {
        compression.max_height = h;
    }
    if cli.convert {
        compression.convert_to_target_format = true;
    }
    if let Some(f) = cli.target_format {
        compression.target_format = f;
    }
    if let Some(q) = cli.quality {
        compression.target_quality = q;
    }
    if let Some(t) = cli.lossless_threshold {
        compression.lossless_threshold_bytes = t;
    }
    if let Some(r) = cli.min_savings {
        compression.min_savings_ratio = r;
    }

    let mut builder = LocalizeConfig::builder()
        .images_root(cli.images_dir.clone().unwrap_or(base.images_root))
        .link_prefix(cli.link_prefix.clone().unwrap_or(base.link_prefix))
        .concurrency(cli.concurrency.unwrap_or(base.concurrency))
        .max_retries(cli.max_retries.unwrap_or(base.max_retries))
        .retry_base_delay_ms(base.retry_base_delay_ms)
        .timeout_ms(cli.timeout_ms.unwrap_or(base.timeout_ms))
        .min_payload_bytes(base.min_payload_bytes)
        .compress(base.compress && !cli.no_compress)
        .compression(compression)
        .user_agent(base.user_agent);

    if let Some(ms) = cli.deadline_ms.or(base.deadline_ms) {
        builder = builder.deadline_ms(ms);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    Ok(builder.build()?)
}
