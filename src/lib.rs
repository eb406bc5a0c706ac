//! # mdimg-localize
//!
//! Download the remote images a Markdown document points at, store them
//! under a dated local directory, optionally shrink or convert them, and
//! rewrite the document so every reference uses the local copy.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Extract    front-matter covers, ![alt](url), <img src="url">
//!  ├─ 2. Paths      <images_root>/YYYY/MM/DD/<sanitized-name>.<ext>
//!  ├─ 3. Fetch      batches of `concurrency`, retry with linear backoff
//!  ├─ 4. Transcode  resize / convert; keep only if it saves enough
//!  └─ 5. Rewrite    splice local links back into the text
//! ```
//!
//! A run is best-effort: an image that cannot be fetched keeps its remote
//! URL and shows up in [`LocalizeOutput::assets`] with its error. The run
//! itself only fails for configuration problems or an unreadable document.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mdimg_localize::{localize, LocalizeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LocalizeConfig::builder()
//!         .images_root("source/images")
//!         .build()?;
//!     let doc = std::fs::read_to_string("source/_posts/hello.md")?;
//!     let output = localize(&doc, &config).await?;
//!     println!("{}", output.document);
//!     eprintln!("{}/{} localized", output.stats.localized, output.stats.total_references);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mdimg` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! mdimg-localize = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod localize;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod sink;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CompressionConfig, LocalizeConfig, LocalizeConfigBuilder, TargetFormat};
pub use error::{AssetError, LocalizeError};
pub use localize::{inspect, localize, localize_file, localize_sync, write_document, Localizer};
pub use output::{AssetReport, LocalizeOutput, LocalizeStats};
pub use pipeline::extract::ReferenceCategory;
pub use pipeline::fetch::RetryPolicy;
pub use pipeline::paths::ImageReference;
pub use pipeline::transcode::{Encoding, TranscodeAction};
pub use progress::{LocalizeProgressCallback, NoopProgressCallback, ProgressCallback};
pub use sink::{LogLevel, LogRecord, LogSink, MemorySink, NullSink, TracingSink};
