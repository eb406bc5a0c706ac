//! Run entry points: extract → assign paths → fetch → transcode → rewrite.
//!
//! [`Localizer`] is the configurable form (custom log sink, retry policy,
//! fixed clock). The free functions [`localize`], [`localize_file`],
//! [`localize_sync`] and [`inspect`] cover the common cases with defaults.
//!
//! A run only fails as a whole for configuration or I/O problems with the
//! document itself. Per-image failures end up in
//! [`LocalizeOutput::assets`] and leave the remote URL in place.

use crate::config::LocalizeConfig;
use crate::error::{AssetError, LocalizeError};
use crate::output::{AssetReport, LocalizeOutput, LocalizeStats};
use crate::pipeline::extract::extract_references;
use crate::pipeline::fetch::{FetchResult, FetchedAsset, Fetcher, RetryPolicy};
use crate::pipeline::paths::{assign_paths, ImageReference};
use crate::pipeline::rewrite::rewrite_document;
use crate::pipeline::transcode::{transcode, TranscodeAction, TranscodeOutcome};
use crate::sink::{LogSink, TracingSink};
use chrono::NaiveDateTime;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// A configured localization pipeline.
///
/// ```rust,no_run
/// use mdimg_localize::{LocalizeConfig, Localizer};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = LocalizeConfig::builder().images_root("source/images").build()?;
/// let doc = "![logo](https://example.com/logo.png)";
/// let output = Localizer::new(config).run(doc).await?;
/// println!("{}", output.document);
/// # Ok(())
/// # }
/// ```
pub struct Localizer {
    config: LocalizeConfig,
    sink: Arc<dyn LogSink>,
    policy: RetryPolicy,
    clock: Option<NaiveDateTime>,
}

impl Localizer {
    pub fn new(config: LocalizeConfig) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self {
            config,
            sink: Arc::new(TracingSink),
            policy,
            clock: None,
        }
    }

    /// Send pipeline log records to `sink` instead of `tracing`.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the retry policy derived from the configuration.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pin the time used for the `YYYY/MM/DD` bucket. Defaults to local now.
    pub fn with_clock(mut self, at: NaiveDateTime) -> Self {
        self.clock = Some(at);
        self
    }

    pub fn config(&self) -> &LocalizeConfig {
        &self.config
    }

    fn now(&self) -> NaiveDateTime {
        self.clock
            .unwrap_or_else(|| chrono::Local::now().naive_local())
    }

    /// Extraction and path assignment only; nothing touches the network or disk.
    pub fn inspect(&self, doc: &str) -> Vec<ImageReference> {
        let refs = extract_references(doc, self.sink.as_ref());
        assign_paths(refs, self.now(), &self.config, self.sink.as_ref())
    }

    /// Localize every remote image in `doc` and return the rewritten document.
    ///
    /// # Errors
    /// Only for an invalid configuration or an HTTP client that cannot be
    /// built. Per-image failures are reported in the output.
    pub async fn run(&self, doc: &str) -> Result<LocalizeOutput, LocalizeError> {
        let started = Instant::now();
        self.config.validate()?;
        let sink = self.sink.as_ref();

        // ── Step 1: Extract and assign paths ─────────────────────────────
        let refs = self.inspect(doc);
        let total = refs.len();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_start(total);
        }
        if refs.is_empty() {
            sink.info("RUN", "no remote images; document unchanged".to_string());
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_run_complete(0, 0);
            }
            return Ok(LocalizeOutput {
                document: doc.to_string(),
                assets: Vec::new(),
                stats: LocalizeStats {
                    duration_ms: started.elapsed().as_millis() as u64,
                    ..Default::default()
                },
            });
        }

        // ── Step 2: Fetch ────────────────────────────────────────────────
        let fetcher = Fetcher::new(&self.config, self.policy.clone(), self.sink.clone())?;
        let fetched = fetcher.fetch_all(refs.clone()).await;
        let bytes_downloaded = fetched
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok())
            .filter(|a| !a.skipped)
            .map(|a| a.bytes)
            .sum();

        // ── Step 3: Transcode ────────────────────────────────────────────
        let transcoded = self.transcode_all(&fetched).await;

        // ── Step 4: Reports, in extraction order ─────────────────────────
        let mut by_url: HashMap<String, FetchResult> = fetched
            .into_iter()
            .map(|r| (r.reference.original_url.clone(), r))
            .collect();
        let mut assets = Vec::with_capacity(total);
        for reference in refs {
            let Some(result) = by_url.remove(&reference.original_url) else {
                return Err(LocalizeError::Internal(format!(
                    "no fetch result for '{}'",
                    reference.original_url
                )));
            };
            let outcome = transcoded.get(&reference.original_url);
            assets.push(self.report(result, outcome).await);
        }

        // ── Step 5: Rewrite ──────────────────────────────────────────────
        let links: HashMap<String, String> = assets
            .iter()
            .filter_map(|a| Some((a.original_url.clone(), a.local_link.clone()?)))
            .collect();
        let document = rewrite_document(doc, &links, sink);

        let bytes_saved = transcoded
            .values()
            .filter(|o| {
                matches!(
                    o.action,
                    TranscodeAction::Resized { .. } | TranscodeAction::Converted { .. }
                )
            })
            .map(|o| o.bytes_before.saturating_sub(o.bytes_after))
            .sum();
        let mut stats = LocalizeStats::from_reports(&assets, bytes_downloaded, bytes_saved);
        stats.duration_ms = started.elapsed().as_millis() as u64;

        sink.info(
            "RUN",
            format!(
                "localized {}/{} image(s), {} failed, {} already present, {}ms",
                stats.localized,
                stats.total_references,
                stats.failed,
                stats.skipped_downloads,
                stats.duration_ms
            ),
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_complete(stats.total_references, stats.localized);
        }

        Ok(LocalizeOutput {
            document,
            assets,
            stats,
        })
    }

    /// Transcode every fetched file, at most `concurrency` at a time.
    async fn transcode_all(&self, fetched: &[FetchResult]) -> HashMap<String, TranscodeOutcome> {
        if !self.config.compress {
            return HashMap::new();
        }
        let jobs: Vec<(String, FetchedAsset)> = fetched
            .iter()
            .filter_map(|r| {
                let asset = r.outcome.as_ref().ok()?;
                Some((r.reference.original_url.clone(), asset.clone()))
            })
            .collect();

        stream::iter(jobs)
            .map(|(url, asset)| {
                let config = self.config.compression.clone();
                let sink = self.sink.clone();
                async move {
                    let outcome = transcode(asset.path, asset.relative, config, sink).await;
                    (url, outcome)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    async fn report(
        &self,
        result: FetchResult,
        transcoded: Option<&TranscodeOutcome>,
    ) -> AssetReport {
        let FetchResult {
            reference,
            outcome,
            attempts_used,
        } = result;
        let mut report = AssetReport {
            original_url: reference.original_url.clone(),
            category: reference.category,
            alt_text: reference.alt_text.clone(),
            final_local_path: None,
            local_link: None,
            succeeded: false,
            skipped_download: false,
            attempts: attempts_used,
            bytes: 0,
            transcode: transcoded.map(|t| t.action.clone()),
            error: None,
        };

        let asset = match outcome {
            Ok(asset) => asset,
            Err(e) => {
                self.fail(&mut report, e);
                return report;
            }
        };
        report.skipped_download = asset.skipped;

        let (path, relative, bytes) = match transcoded {
            Some(t) => (t.final_path.clone(), t.final_relative.clone(), t.bytes_after),
            None => (asset.path, asset.relative, asset.bytes),
        };

        // Never link to something that is not on disk.
        if !file_exists(&path).await {
            self.fail(
                &mut report,
                AssetError::filesystem(&path, "file missing after processing"),
            );
            return report;
        }

        let link = self.config.link_for(&relative);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_asset_complete(&reference.original_url, &link);
        }
        report.final_local_path = Some(path);
        report.local_link = Some(link);
        report.succeeded = true;
        report.bytes = bytes;
        report
    }

    fn fail(&self, report: &mut AssetReport, error: AssetError) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_asset_error(&report.original_url, &error.to_string());
        }
        self.sink.warn(
            "RUN",
            format!("keeping remote URL {}: {error}", report.original_url),
        );
        report.error = Some(error);
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

// ── Free functions ──────────────────────────────────────────────────────────

/// Localize `doc` with `config`, logging through `tracing`.
///
/// ```rust,no_run
/// use mdimg_localize::{localize, LocalizeConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let doc = std::fs::read_to_string("post.md")?;
/// let output = localize(&doc, &LocalizeConfig::default()).await?;
/// for failed in output.failures() {
///     eprintln!("still remote: {}", failed.original_url);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn localize(doc: &str, config: &LocalizeConfig) -> Result<LocalizeOutput, LocalizeError> {
    Localizer::new(config.clone()).run(doc).await
}

/// Localize a document on disk.
///
/// The result is written to `output`, or back over `input` when `output` is
/// `None`. Uses atomic write (temp file + rename) so an interrupted run never
/// leaves a half-written document.
pub async fn localize_file(
    input: impl AsRef<Path>,
    output: Option<&Path>,
    config: &LocalizeConfig,
) -> Result<LocalizeOutput, LocalizeError> {
    let input = input.as_ref();
    let doc = tokio::fs::read_to_string(input)
        .await
        .map_err(|e| LocalizeError::InputReadFailed {
            path: input.to_path_buf(),
            source: e,
        })?;

    let result = localize(&doc, config).await?;
    let target = output.unwrap_or(input);
    write_document(target, &result.document).await?;
    Ok(result)
}

/// Write `content` to `path` via a sibling `.tmp` file.
pub async fn write_document(path: &Path, content: &str) -> Result<(), LocalizeError> {
    let fail = |e| LocalizeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }
    let tmp_path = tmp_sibling(path);
    tokio::fs::write(&tmp_path, content).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Synchronous wrapper around [`localize`].
///
/// Creates a temporary tokio runtime internally.
pub fn localize_sync(doc: &str, config: &LocalizeConfig) -> Result<LocalizeOutput, LocalizeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| LocalizeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(localize(doc, config))
}

/// List the references a run would localize and where they would go.
///
/// Does not touch the network or the filesystem.
pub fn inspect(doc: &str, config: &LocalizeConfig) -> Vec<ImageReference> {
    Localizer::new(config.clone()).inspect(doc)
}
