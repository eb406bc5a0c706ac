//! Configuration types for image localization.
//!
//! All run behaviour is controlled through [`LocalizeConfig`], built via its
//! [`LocalizeConfigBuilder`] or deserialised from a JSON file. The
//! compression policy lives in its own [`CompressionConfig`] so it can be
//! handed to the transcode stage without the network settings.
//!
//! The configuration is immutable for the duration of a run.

use crate::error::LocalizeError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Browser-like user agent; several image CDNs reject unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Configuration for one localization run.
///
/// # Example
/// ```rust
/// use mdimg_localize::LocalizeConfig;
///
/// let config = LocalizeConfig::builder()
///     .images_root("source/images")
///     .concurrency(4)
///     .max_retries(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizeConfig {
    /// Directory under which `YYYY/MM/DD/<name>.<ext>` files are written.
    ///
    /// Names are only disambiguated within one run. A file already on disk
    /// under the generated name is reused without a download, even when an
    /// earlier run fetched it from a different URL with the same file name;
    /// the `FILE` record for the skip names both the URL and the reused path.
    pub images_root: PathBuf,

    /// Prefix written into the document in front of the relative path.
    /// Default: `/images`, so a file at `<root>/2024/05/01/a.png` is linked
    /// as `/images/2024/05/01/a.png`.
    pub link_prefix: String,

    /// Width of one fetch batch. Default: 3.
    ///
    /// Batch *k*+1 starts only once every fetch in batch *k* has settled,
    /// so this is also the cap on simultaneous connections.
    pub concurrency: usize,

    /// Attempts per reference, redirects included. Default: 3.
    pub max_retries: u32,

    /// Base delay of the linear backoff (`attempt × base`). Default: 1000.
    pub retry_base_delay_ms: u64,

    /// Per-request transport timeout in milliseconds. Default: 30000.
    pub timeout_ms: u64,

    /// Downloads below this size are treated as error pages. Default: 100.
    pub min_payload_bytes: u64,

    /// Run the transcode stage at all. Default: true.
    pub compress: bool,

    /// Resize / re-encode policy.
    pub compression: CompressionConfig,

    /// `User-Agent` header sent with every image request.
    pub user_agent: String,

    /// Optional whole-run deadline in milliseconds. Default: none.
    ///
    /// Checked between batches; references whose batch has not started when
    /// it expires are reported as failed and keep their remote URL.
    pub deadline_ms: Option<u64>,

    /// Optional progress callback for per-asset events.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for LocalizeConfig {
    fn default() -> Self {
        Self {
            images_root: PathBuf::from("images"),
            link_prefix: "/images".to_string(),
            concurrency: 3,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            timeout_ms: 30_000,
            min_payload_bytes: 100,
            compress: true,
            compression: CompressionConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            deadline_ms: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for LocalizeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalizeConfig")
            .field("images_root", &self.images_root)
            .field("link_prefix", &self.link_prefix)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("timeout_ms", &self.timeout_ms)
            .field("min_payload_bytes", &self.min_payload_bytes)
            .field("compress", &self.compress)
            .field("compression", &self.compression)
            .field("deadline_ms", &self.deadline_ms)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn LocalizeProgressCallback>"),
            )
            .finish()
    }
}

impl LocalizeConfig {
    /// Create a new builder for `LocalizeConfig`.
    pub fn builder() -> LocalizeConfigBuilder {
        LocalizeConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LocalizeError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| LocalizeError::ConfigFile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| LocalizeError::ConfigFile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints. Called by `build()` and the loaders.
    pub fn validate(&self) -> Result<(), LocalizeError> {
        if self.concurrency == 0 {
            return Err(LocalizeError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if self.max_retries == 0 {
            return Err(LocalizeError::InvalidConfig("max_retries must be ≥ 1".into()));
        }
        if self.timeout_ms == 0 {
            return Err(LocalizeError::InvalidConfig("timeout_ms must be > 0".into()));
        }
        self.compression.validate()
    }

    /// Document-facing link for a relative path: `<link_prefix>/<relative>`.
    pub fn link_for(&self, relative: &str) -> String {
        let prefix = self.link_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{prefix}/{relative}")
        }
    }

    /// Extension a converted file is written with, when conversion can
    /// happen at all in this run.
    pub fn converted_extension(&self) -> Option<&'static str> {
        (self.compress && self.compression.convert_to_target_format)
            .then(|| self.compression.target_format.extension())
    }
}

/// Builder for [`LocalizeConfig`].
#[derive(Debug)]
pub struct LocalizeConfigBuilder {
    config: LocalizeConfig,
}

impl LocalizeConfigBuilder {
    pub fn images_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.images_root = dir.into();
        self
    }

    pub fn link_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.link_prefix = prefix.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.max(1);
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms.max(1);
        self
    }

    pub fn min_payload_bytes(mut self, n: u64) -> Self {
        self.config.min_payload_bytes = n;
        self
    }

    pub fn compress(mut self, v: bool) -> Self {
        self.config.compress = v;
        self
    }

    pub fn compression(mut self, c: CompressionConfig) -> Self {
        self.config.compression = c;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn deadline_ms(mut self, ms: u64) -> Self {
        self.config.deadline_ms = Some(ms);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<LocalizeConfig, LocalizeError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Resize and re-encode policy applied to every fetched image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Bounding box width; larger images are shrunk to fit. Default: 2400.
    pub max_width: u32,
    /// Bounding box height. Default: 2400.
    pub max_height: u32,
    /// Convert sources into [`Self::target_format`]. Default: false.
    pub convert_to_target_format: bool,
    /// Format used when conversion is enabled. Default: WebP.
    pub target_format: TargetFormat,
    /// Lossy quality, 1–100. Default: 90.
    pub target_quality: u8,
    /// Palette-style sources below this size are converted losslessly.
    /// Default: 512000 (500 KiB).
    pub lossless_threshold_bytes: u64,
    /// Allow the lossless path at all. When false every conversion is lossy.
    pub lossless_palette_sources: bool,
    /// Keep the aspect ratio when shrinking. Default: true.
    pub preserve_aspect_ratio: bool,
    /// Required fractional saving before a re-encoded file replaces the
    /// original. 0.05 means the result must be under 95 % of the source size.
    pub min_savings_ratio: f64,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_width: 2400,
            max_height: 2400,
            convert_to_target_format: false,
            target_format: TargetFormat::WebP,
            target_quality: 90,
            lossless_threshold_bytes: 500 * 1024,
            lossless_palette_sources: true,
            preserve_aspect_ratio: true,
            min_savings_ratio: 0.05,
        }
    }
}

impl CompressionConfig {
    pub fn validate(&self) -> Result<(), LocalizeError> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(LocalizeError::InvalidConfig(
                "max_width and max_height must be > 0".into(),
            ));
        }
        if !(1..=100).contains(&self.target_quality) {
            return Err(LocalizeError::InvalidConfig(format!(
                "target_quality must be 1–100, got {}",
                self.target_quality
            )));
        }
        if !(0.0..1.0).contains(&self.min_savings_ratio) {
            return Err(LocalizeError::InvalidConfig(format!(
                "min_savings_ratio must be in [0, 1), got {}",
                self.min_savings_ratio
            )));
        }
        Ok(())
    }

    /// Largest output size (exclusive) that still counts as a saving.
    pub fn acceptance_limit(&self, original_bytes: u64) -> u64 {
        (original_bytes as f64 * (1.0 - self.min_savings_ratio)).floor() as u64
    }
}

/// Output format for converted images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// WebP; lossless for small palette sources, lossy otherwise. (default)
    #[default]
    WebP,
    /// Baseline JPEG; has no lossless mode, so palette sources stay in
    /// their own format and are only resized.
    Jpeg,
}

impl TargetFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::WebP => "webp",
            TargetFormat::Jpeg => "jpg",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            TargetFormat::WebP => image::ImageFormat::WebP,
            TargetFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }

    pub fn supports_lossless(self) -> bool {
        matches!(self, TargetFormat::WebP)
    }
}

impl std::str::FromStr for TargetFormat {
    type Err = LocalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webp" => Ok(TargetFormat::WebP),
            "jpeg" | "jpg" => Ok(TargetFormat::Jpeg),
            other => Err(LocalizeError::InvalidConfig(format!(
                "unknown target format '{other}' (expected webp or jpeg)"
            ))),
        }
    }
}
