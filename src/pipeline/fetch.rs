//! Fetching: download every unique reference onto local disk.
//!
//! ## Batching
//!
//! References are processed in batches of `concurrency`. Inside a batch all
//! fetches run at once (`buffer_unordered`) and results are recorded in
//! completion order; the next batch starts only after every fetch in the
//! current one has settled. This caps open connections without letting a
//! single slow host stall more than its own batch.
//!
//! ## Attempts
//!
//! Each reference gets [`RetryPolicy::max_attempts`] attempts. A redirect is
//! followed by re-issuing the request against `Location` and consumes one
//! attempt from the same budget. A failed attempt waits
//! [`RetryPolicy::delay_after`] before the next one.
//!
//! Bodies are streamed to `<target>.part` and renamed into place only after
//! the size check passes, so a timeout or error page never leaves a file at
//! the target path.

use crate::config::LocalizeConfig;
use crate::error::{AssetError, LocalizeError};
use crate::pipeline::paths::{self, ImageReference};
use crate::progress::ProgressCallback;
use crate::sink::{LogLevel, LogRecord, LogSink};
use futures::stream::{self, StreamExt};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, LOCATION, REFERER, USER_AGENT};
use reqwest::{Client, Response};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, Instant};

const ACCEPT_IMAGES: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";
const ACCEPT_LANGUAGES: &str = "en-US,en;q=0.9,zh-CN;q=0.8";

// ── Retry policy ────────────────────────────────────────────────────────────

/// How many attempts a reference gets and how long to wait between them.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Arc<dyn Fn(u32) -> Duration + Send + Sync>,
}

impl RetryPolicy {
    /// `attempt × base` after the n-th failed attempt (1-based).
    pub fn linear(max_attempts: u32, base: Duration) -> Self {
        Self::with_backoff(max_attempts, move |attempt| base * attempt)
    }

    /// Retry immediately. Meant for tests.
    pub fn no_delay(max_attempts: u32) -> Self {
        Self::with_backoff(max_attempts, |_| Duration::ZERO)
    }

    pub fn with_backoff(
        max_attempts: u32,
        backoff: impl Fn(u32) -> Duration + Send + Sync + 'static,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(backoff),
        }
    }

    /// The policy described by `max_retries` / `retry_base_delay_ms`.
    pub fn from_config(config: &LocalizeConfig) -> Self {
        Self::linear(
            config.max_retries,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &"<fn>")
            .finish()
    }
}

// ── Results ─────────────────────────────────────────────────────────────────

/// A reference whose bytes are on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedAsset {
    /// File actually on disk; a converted sibling when one already existed.
    pub path: PathBuf,
    /// `path` relative to the images root, `/`-separated.
    pub relative: String,
    pub bytes: u64,
    /// The file was already present and no request was made.
    pub skipped: bool,
}

/// Outcome of fetching one reference.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub reference: ImageReference,
    pub outcome: Result<FetchedAsset, AssetError>,
    pub attempts_used: u32,
}

enum Attempt {
    Done(u64),
    Redirect(String),
}

// ── Fetcher ─────────────────────────────────────────────────────────────────

/// Downloads references with bounded concurrency and retry.
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    config: LocalizeConfig,
    sink: Arc<dyn LogSink>,
    progress: Option<ProgressCallback>,
}

impl Fetcher {
    /// Build a fetcher with its own HTTP client.
    ///
    /// Automatic redirects are disabled; [`Fetcher::fetch_one`] follows them
    /// itself so they share the attempt budget.
    pub fn new(
        config: &LocalizeConfig,
        policy: RetryPolicy,
        sink: Arc<dyn LogSink>,
    ) -> Result<Self, LocalizeError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| LocalizeError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            policy,
            config: config.clone(),
            sink,
            progress: config.progress_callback.clone(),
        })
    }

    /// Fetch all references, batch by batch.
    pub async fn fetch_all(&self, mut refs: Vec<ImageReference>) -> Vec<FetchResult> {
        let started = Instant::now();
        let width = self.config.concurrency.max(1);
        let mut results = Vec::with_capacity(refs.len());
        let mut batch_no = 0usize;

        while !refs.is_empty() {
            let batch: Vec<ImageReference> = refs.drain(..refs.len().min(width)).collect();
            batch_no += 1;

            if let Some(deadline_ms) = self.config.deadline_ms {
                if started.elapsed() >= Duration::from_millis(deadline_ms) {
                    self.sink.warn(
                        "NETWORK",
                        format!("run deadline passed; {} reference(s) not attempted", batch.len()),
                    );
                    results.extend(batch.into_iter().map(|reference| FetchResult {
                        outcome: Err(AssetError::DeadlineExceeded {
                            url: reference.original_url.clone(),
                            deadline_ms,
                        }),
                        reference,
                        attempts_used: 0,
                    }));
                    continue;
                }
            }

            self.sink
                .debug("NETWORK", format!("batch {batch_no}: {} reference(s)", batch.len()));
            let settled: Vec<FetchResult> = stream::iter(batch)
                .map(|reference| self.fetch_one(reference))
                .buffer_unordered(width)
                .collect()
                .await;
            results.extend(settled);
        }

        results
    }

    /// Fetch one reference, retrying per the policy.
    pub async fn fetch_one(&self, reference: ImageReference) -> FetchResult {
        if let Some(asset) = self.existing_asset(&reference).await {
            self.sink.record(LogRecord {
                level: LogLevel::Info,
                category: "FILE",
                message: format!("already present, skipping download: {}", asset.path.display()),
                details: Some(serde_json::json!({
                    "url": reference.original_url,
                    "path": asset.relative,
                })),
            });
            return FetchResult {
                reference,
                outcome: Ok(asset),
                attempts_used: 0,
            };
        }

        if let Some(ref cb) = self.progress {
            cb.on_asset_start(&reference.original_url);
        }

        let target = reference.local_absolute_path.clone();
        if let Some(parent) = target.parent() {
            // create_dir_all is a no-op when another task already made it
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                let err = AssetError::filesystem(parent, e);
                self.sink.error("FILE", err.to_string(), None);
                return FetchResult {
                    reference,
                    outcome: Err(err),
                    attempts_used: 0,
                };
            }
        }

        let max = self.policy.max_attempts();
        let mut url = reference.original_url.clone();
        let mut hops = 0u32;
        let mut last_err: Option<AssetError> = None;

        for attempt in 1..=max {
            match self.attempt(&url, &target).await {
                Ok(Attempt::Done(bytes)) => {
                    self.sink.info(
                        "NETWORK",
                        format!("downloaded {} ({bytes} bytes)", reference.original_url),
                    );
                    let asset = FetchedAsset {
                        path: target,
                        relative: reference.local_relative_path.clone(),
                        bytes,
                        skipped: false,
                    };
                    return FetchResult {
                        reference,
                        outcome: Ok(asset),
                        attempts_used: attempt,
                    };
                }
                Ok(Attempt::Redirect(next)) => {
                    hops += 1;
                    self.sink.debug("NETWORK", format!("redirect {url} -> {next}"));
                    url = next;
                    last_err = Some(AssetError::RedirectLoop {
                        url: reference.original_url.clone(),
                        hops,
                    });
                }
                Err(e) => {
                    self.sink.warn(
                        "NETWORK",
                        format!("attempt {attempt}/{max} failed: {e}"),
                    );
                    if !e.is_retryable() {
                        self.sink.error("FILE", e.to_string(), None);
                        return FetchResult {
                            reference,
                            outcome: Err(e),
                            attempts_used: attempt,
                        };
                    }
                    last_err = Some(e);
                    if attempt < max {
                        sleep(self.policy.delay_after(attempt)).await;
                    }
                }
            }
        }

        let err = last_err.unwrap_or_else(|| unreachable_error(&url));
        self.sink.error(
            "NETWORK",
            format!("giving up on {}", reference.original_url),
            Some(serde_json::json!({ "error": err.to_string(), "attempts": max })),
        );
        FetchResult {
            reference,
            outcome: Err(err),
            attempts_used: max,
        }
    }

    /// A target already on disk from an earlier run: the generated path, or
    /// its converted sibling when conversion is on. Both names belong to this
    /// reference alone; `assign_paths` reserves the sibling.
    async fn existing_asset(&self, reference: &ImageReference) -> Option<FetchedAsset> {
        let mut candidates = vec![reference.local_relative_path.clone()];
        if let Some(ext) = self.config.converted_extension() {
            let sibling = paths::with_extension(&reference.local_relative_path, ext);
            if sibling != reference.local_relative_path {
                candidates.push(sibling);
            }
        }

        for relative in candidates {
            let path = paths::absolute_path(&self.config, &relative);
            if let Ok(meta) = tokio::fs::metadata(&path).await {
                if meta.is_file() {
                    return Some(FetchedAsset {
                        path,
                        relative,
                        bytes: meta.len(),
                        skipped: true,
                    });
                }
            }
        }
        None
    }

    async fn attempt(&self, url: &str, target: &Path) -> Result<Attempt, AssetError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, ACCEPT_IMAGES)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGES)
            .header(REFERER, url)
            .header("Sec-Fetch-Mode", "no-cors")
            .header("Sec-Fetch-Site", "cross-site")
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = response.status();
        if status.is_redirection() {
            return redirect_target(url, &response)
                .map(Attempt::Redirect)
                .ok_or_else(|| AssetError::MissingRedirectTarget {
                    url: url.to_string(),
                });
        }
        if !status.is_success() {
            return Err(AssetError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(ct) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !ct.starts_with("image/") {
                self.sink
                    .warn("NETWORK", format!("suspicious Content-Type '{ct}' for {url}"));
            }
        }

        let part = part_path(target);
        let written = self.stream_to_file(url, response, &part).await;
        let bytes = match written {
            Ok(n) => n,
            Err(e) => {
                discard(&part).await;
                return Err(e);
            }
        };

        if bytes < self.config.min_payload_bytes {
            discard(&part).await;
            return Err(AssetError::UndersizedPayload {
                url: url.to_string(),
                bytes,
                min: self.config.min_payload_bytes,
            });
        }

        if let Err(e) = tokio::fs::rename(&part, target).await {
            discard(&part).await;
            return Err(AssetError::filesystem(target, e));
        }
        Ok(Attempt::Done(bytes))
    }

    async fn stream_to_file(
        &self,
        url: &str,
        mut response: Response,
        part: &Path,
    ) -> Result<u64, AssetError> {
        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| AssetError::filesystem(part, e))?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(url, e))? {
            file.write_all(&chunk)
                .await
                .map_err(|e| AssetError::filesystem(part, e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| AssetError::filesystem(part, e))?;
        Ok(written)
    }

    fn classify(&self, url: &str, e: reqwest::Error) -> AssetError {
        if e.is_timeout() {
            AssetError::Timeout {
                url: url.to_string(),
                timeout_ms: self.config.timeout_ms,
            }
        } else {
            AssetError::Transport {
                url: url.to_string(),
                detail: e.to_string(),
            }
        }
    }
}

/// Absolute URL named by a redirect's `Location`, resolved against `url`.
fn redirect_target(url: &str, response: &Response) -> Option<String> {
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    let base = reqwest::Url::parse(url).ok()?;
    base.join(location).ok().map(|u| u.to_string())
}

fn part_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn discard(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}

fn unreachable_error(url: &str) -> AssetError {
    AssetError::Transport {
        url: url.to_string(),
        detail: "no attempt was made".to_string(),
    }
}
