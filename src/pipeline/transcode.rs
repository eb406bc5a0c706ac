//! Transcode policy: decide how to resize / re-encode a fetched image, then
//! do it and keep the result only if it pays off.
//!
//! [`plan`] is pure and decides from metadata alone (format, dimensions,
//! byte size). [`apply`] reads the file, executes the plan and applies the
//! accept-or-revert rule: the new bytes replace the old ones only when they
//! are under [`CompressionConfig::acceptance_limit`]. Every failure leaves
//! the original file untouched and is reported as
//! [`TranscodeAction::Fallback`].
//!
//! Decoding and encoding are CPU-bound; [`transcode`] runs [`apply`] inside
//! `spawn_blocking`.

use crate::config::{CompressionConfig, TargetFormat};
use crate::pipeline::paths;
use crate::sink::LogSink;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ── Plan ────────────────────────────────────────────────────────────────────

/// Output encoding chosen for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Png,
    Gif,
    Jpeg { quality: u8 },
    #[serde(rename = "webp_lossless")]
    WebPLossless,
    #[serde(rename = "webp_lossy")]
    WebPLossy { quality: u8 },
}

impl Encoding {
    pub fn extension(self) -> &'static str {
        match self {
            Encoding::Png => "png",
            Encoding::Gif => "gif",
            Encoding::Jpeg { .. } => "jpg",
            Encoding::WebPLossless | Encoding::WebPLossy { .. } => "webp",
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Encoding::Png => ImageFormat::Png,
            Encoding::Gif => ImageFormat::Gif,
            Encoding::Jpeg { .. } => ImageFormat::Jpeg,
            Encoding::WebPLossless | Encoding::WebPLossy { .. } => ImageFormat::WebP,
        }
    }

    /// Re-encode in the source's own format, if we can write it.
    fn same_as(format: ImageFormat, config: &CompressionConfig) -> Option<Self> {
        let quality = config.target_quality;
        match format {
            ImageFormat::Png => Some(Encoding::Png),
            ImageFormat::Gif => Some(Encoding::Gif),
            ImageFormat::Jpeg => Some(Encoding::Jpeg { quality }),
            ImageFormat::WebP if config.lossless_palette_sources => Some(Encoding::WebPLossless),
            ImageFormat::WebP => Some(Encoding::WebPLossy { quality }),
            _ => None,
        }
    }

    fn target(target: TargetFormat, lossless: bool, quality: u8) -> Self {
        match (target, lossless) {
            (TargetFormat::WebP, true) => Encoding::WebPLossless,
            (TargetFormat::WebP, false) => Encoding::WebPLossy { quality },
            (TargetFormat::Jpeg, _) => Encoding::Jpeg { quality },
        }
    }
}

/// What [`apply`] should do with one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodePlan {
    /// New pixel dimensions, when the image exceeds the bounding box.
    pub resize_to: Option<(u32, u32)>,
    /// Output encoding; `None` leaves the file alone.
    pub encoding: Option<Encoding>,
    /// The encoding changes the format (and so the extension).
    pub converts: bool,
}

impl TranscodePlan {
    pub fn is_noop(&self) -> bool {
        self.encoding.is_none()
    }
}

/// PNG and GIF: flat-colour sources where lossless WebP tends to win.
pub fn is_palette_style(format: ImageFormat) -> bool {
    matches!(format, ImageFormat::Png | ImageFormat::Gif)
}

/// Dimensions after fitting `(w, h)` inside the configured box, or `None`
/// when it already fits. Never upscales.
pub fn fit_within(dims: (u32, u32), config: &CompressionConfig) -> Option<(u32, u32)> {
    let (w, h) = dims;
    let (max_w, max_h) = (config.max_width, config.max_height);
    if w <= max_w && h <= max_h {
        return None;
    }
    if !config.preserve_aspect_ratio {
        return Some((w.min(max_w), h.min(max_h)));
    }
    let scale = f64::min(max_w as f64 / w as f64, max_h as f64 / h as f64);
    let nw = ((w as f64 * scale).round() as u32).clamp(1, max_w);
    let nh = ((h as f64 * scale).round() as u32).clamp(1, max_h);
    Some((nw, nh))
}

/// Decide what to do with an image from its metadata.
pub fn plan(
    format: ImageFormat,
    dims: (u32, u32),
    size_bytes: u64,
    config: &CompressionConfig,
) -> TranscodePlan {
    let resize_to = fit_within(dims, config);
    let quality = config.target_quality;
    let target = config.target_format;

    let mut conversion = None;
    if config.convert_to_target_format && format != target.image_format() {
        let lossless = config.lossless_palette_sources
            && is_palette_style(format)
            && size_bytes < config.lossless_threshold_bytes;
        // JPEG has no lossless mode; small palette sources keep their format.
        if !lossless || target.supports_lossless() {
            conversion = Some(Encoding::target(target, lossless, quality));
        }
    }

    let encoding = match conversion {
        Some(enc) => Some(enc),
        None if resize_to.is_some() => Encoding::same_as(format, config),
        None => None,
    };

    TranscodePlan {
        resize_to,
        encoding,
        converts: conversion.is_some(),
    }
}

// ── Outcome ─────────────────────────────────────────────────────────────────

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TranscodeAction {
    /// Nothing needed doing.
    Unchanged,
    /// Shrunk and re-encoded in its own format.
    Resized { width: u32, height: u32 },
    /// Re-encoded into another format, possibly also resized.
    Converted { encoding: Encoding, resized: bool },
    /// A result was produced but did not save enough; original kept.
    Reverted { candidate_bytes: u64 },
    /// Something failed; original kept.
    Fallback { reason: String },
}

/// Result of [`apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeOutcome {
    /// File in effect after this stage. Always exists on disk.
    pub final_path: PathBuf,
    /// `final_path` relative to the images root.
    pub final_relative: String,
    pub action: TranscodeAction,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl TranscodeOutcome {
    fn kept(path: &Path, relative: &str, bytes: u64, action: TranscodeAction) -> Self {
        Self {
            final_path: path.to_path_buf(),
            final_relative: relative.to_string(),
            action,
            bytes_before: bytes,
            bytes_after: bytes,
        }
    }
}

// ── Apply ───────────────────────────────────────────────────────────────────

/// Run [`apply`] on the blocking pool.
pub async fn transcode(
    path: PathBuf,
    relative: String,
    config: CompressionConfig,
    sink: Arc<dyn LogSink>,
) -> TranscodeOutcome {
    let fallback_path = path.clone();
    let fallback_relative = relative.clone();
    let joined = tokio::task::spawn_blocking(move || {
        apply(&path, &relative, &config, sink.as_ref())
    })
    .await;
    match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            let bytes = std::fs::metadata(&fallback_path).map(|m| m.len()).unwrap_or(0);
            TranscodeOutcome::kept(
                &fallback_path,
                &fallback_relative,
                bytes,
                TranscodeAction::Fallback {
                    reason: format!("transcode task failed: {e}"),
                },
            )
        }
    }
}

/// Transcode the file at `path` in place per `config`.
///
/// `relative` is `path` below the images root; a converted file keeps it
/// with the extension swapped.
pub fn apply(
    path: &Path,
    relative: &str,
    config: &CompressionConfig,
    sink: &dyn LogSink,
) -> TranscodeOutcome {
    let bytes_before = match std::fs::metadata(path) {
        Ok(m) => m.len(),
        Err(e) => {
            return fallback(path, relative, 0, format!("cannot stat: {e}"), sink);
        }
    };

    let (format, dims) = match read_metadata(path) {
        Ok(meta) => meta,
        Err(reason) => return fallback(path, relative, bytes_before, reason, sink),
    };

    let plan = plan(format, dims, bytes_before, config);
    let Some(encoding) = plan.encoding else {
        sink.debug(
            "TRANSCODE",
            format!("{}: {:?} {}x{}, nothing to do", relative, format, dims.0, dims.1),
        );
        return TranscodeOutcome::kept(path, relative, bytes_before, TranscodeAction::Unchanged);
    };

    let encoded = match decode_and_encode(path, plan.resize_to, encoding) {
        Ok(buf) => buf,
        Err(reason) => return fallback(path, relative, bytes_before, reason, sink),
    };
    let candidate = encoded.len() as u64;

    let limit = config.acceptance_limit(bytes_before);
    if candidate >= limit {
        sink.info(
            "TRANSCODE",
            format!(
                "{relative}: {} bytes → {candidate} bytes does not meet the saving threshold, keeping original",
                bytes_before
            ),
        );
        return TranscodeOutcome::kept(
            path,
            relative,
            bytes_before,
            TranscodeAction::Reverted {
                candidate_bytes: candidate,
            },
        );
    }

    let (new_path, new_relative) = if plan.converts {
        let new_relative = paths::with_extension(relative, encoding.extension());
        (path.with_extension(encoding.extension()), new_relative)
    } else {
        (path.to_path_buf(), relative.to_string())
    };

    if let Err(reason) = write_atomically(&new_path, &encoded) {
        return fallback(path, relative, bytes_before, reason, sink);
    }
    if new_path != path {
        if let Err(e) = std::fs::remove_file(path) {
            sink.warn(
                "FILE",
                format!("converted, but could not remove {}: {e}", path.display()),
            );
        }
    }

    let action = if plan.converts {
        TranscodeAction::Converted {
            encoding,
            resized: plan.resize_to.is_some(),
        }
    } else {
        let (width, height) = plan.resize_to.unwrap_or(dims);
        TranscodeAction::Resized { width, height }
    };
    sink.info(
        "TRANSCODE",
        format!("{relative} → {new_relative}: {bytes_before} → {candidate} bytes ({action:?})"),
    );

    TranscodeOutcome {
        final_path: new_path,
        final_relative: new_relative,
        action,
        bytes_before,
        bytes_after: candidate,
    }
}

fn fallback(
    path: &Path,
    relative: &str,
    bytes: u64,
    reason: String,
    sink: &dyn LogSink,
) -> TranscodeOutcome {
    sink.warn(
        "TRANSCODE",
        format!("{relative}: {reason}; keeping original bytes"),
    );
    TranscodeOutcome::kept(path, relative, bytes, TranscodeAction::Fallback { reason })
}

/// Detected format and pixel dimensions, without decoding pixels.
fn read_metadata(path: &Path) -> Result<(ImageFormat, (u32, u32)), String> {
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| format!("cannot open: {e}"))?;
    let format = reader
        .format()
        .ok_or_else(|| "unrecognised image format".to_string())?;
    let dims = reader
        .into_dimensions()
        .map_err(|e| format!("cannot read dimensions: {e}"))?;
    Ok((format, dims))
}

fn decode_and_encode(
    path: &Path,
    resize_to: Option<(u32, u32)>,
    encoding: Encoding,
) -> Result<Vec<u8>, String> {
    let img = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| format!("cannot open: {e}"))?
        .decode()
        .map_err(|e| format!("decode failed: {e}"))?;

    let img = match resize_to {
        Some((w, h)) => img.resize_exact(w, h, FilterType::Lanczos3),
        None => img,
    };

    encode(&img, encoding)
}

fn encode(img: &DynamicImage, encoding: Encoding) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    match encoding {
        Encoding::Png => {
            let enc = PngEncoder::new_with_quality(
                &mut buf,
                CompressionType::Best,
                PngFilter::Adaptive,
            );
            img.write_with_encoder(enc).map_err(|e| e.to_string())?;
        }
        Encoding::Gif => {
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif)
                .map_err(|e| e.to_string())?;
        }
        Encoding::Jpeg { quality } => {
            let enc = JpegEncoder::new_with_quality(&mut buf, quality);
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_with_encoder(enc)
                .map_err(|e| e.to_string())?;
        }
        Encoding::WebPLossless => {
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_with_encoder(WebPEncoder::new_lossless(&mut buf))
                .map_err(|e| e.to_string())?;
        }
        Encoding::WebPLossy { quality } => {
            let rgba = img.to_rgba8();
            let memory = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
                .encode_simple(false, quality as f32)
                .map_err(|e| format!("webp encode failed: {e:?}"))?;
            buf.extend_from_slice(&memory);
        }
    }
    if buf.is_empty() {
        return Err("encoder produced no output".to_string());
    }
    Ok(buf)
}

/// Write via a sibling temp file and rename over `target`.
fn write_atomically(target: &Path, bytes: &[u8]) -> Result<(), String> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| format!("cannot create temp file in {}: {e}", dir.display()))?;
    tmp.write_all(bytes)
        .map_err(|e| format!("cannot write temp file: {e}"))?;
    tmp.persist(target)
        .map_err(|e| format!("cannot move result to {}: {}", target.display(), e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{LogLevel, MemorySink, NullSink};
    use image::{Rgb, RgbImage};

    fn convert_to(target: TargetFormat) -> CompressionConfig {
        CompressionConfig {
            convert_to_target_format: true,
            target_format: target,
            ..Default::default()
        }
    }

    /// Deterministic RGB noise; PNG cannot compress it.
    fn noise(w: u32, h: u32) -> DynamicImage {
        let mut state: u32 = 0x1234_5678;
        let img = RgbImage::from_fn(w, h, |_, _| {
            let mut next = || {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 24) as u8
            };
            Rgb([next(), next(), next()])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn save_png(dir: &Path, name: &str, img: &DynamicImage) -> PathBuf {
        let path = dir.join(name);
        img.save_with_format(&path, ImageFormat::Png).unwrap();
        path
    }

    // plan

    #[test]
    fn small_palette_source_goes_lossless() {
        let p = plan(ImageFormat::Png, (100, 100), 10_000, &convert_to(TargetFormat::WebP));
        assert_eq!(p.encoding, Some(Encoding::WebPLossless));
        assert!(p.converts);
        assert_eq!(p.resize_to, None);
    }

    #[test]
    fn large_palette_source_goes_lossy() {
        let p = plan(ImageFormat::Png, (100, 100), 600 * 1024, &convert_to(TargetFormat::WebP));
        assert_eq!(p.encoding, Some(Encoding::WebPLossy { quality: 90 }));
    }

    #[test]
    fn photographic_source_goes_lossy() {
        let p = plan(ImageFormat::Jpeg, (800, 600), 1_000, &convert_to(TargetFormat::WebP));
        assert_eq!(p.encoding, Some(Encoding::WebPLossy { quality: 90 }));
    }

    #[test]
    fn lossless_can_be_disabled() {
        let config = CompressionConfig {
            lossless_palette_sources: false,
            ..convert_to(TargetFormat::WebP)
        };
        let p = plan(ImageFormat::Gif, (10, 10), 100, &config);
        assert_eq!(p.encoding, Some(Encoding::WebPLossy { quality: 90 }));
    }

    #[test]
    fn jpeg_target_leaves_small_palette_sources_alone() {
        let config = convert_to(TargetFormat::Jpeg);
        let p = plan(ImageFormat::Png, (100, 100), 1_000, &config);
        assert!(p.is_noop());

        let p = plan(ImageFormat::Png, (5000, 100), 1_000, &config);
        assert_eq!(p.encoding, Some(Encoding::Png));
        assert!(!p.converts);
    }

    #[test]
    fn already_target_format_not_converted() {
        let p = plan(ImageFormat::WebP, (100, 100), 1_000, &convert_to(TargetFormat::WebP));
        assert!(p.is_noop());
    }

    #[test]
    fn conversion_off_only_resizes() {
        let config = CompressionConfig::default();
        assert!(plan(ImageFormat::Jpeg, (2400, 2400), 1_000, &config).is_noop());
        let p = plan(ImageFormat::Jpeg, (4800, 1200), 1_000, &config);
        assert_eq!(p.resize_to, Some((2400, 600)));
        assert_eq!(p.encoding, Some(Encoding::Jpeg { quality: 90 }));
        assert!(!p.converts);
    }

    #[test]
    fn oversized_webp_is_resized_losslessly_by_default() {
        let p = plan(ImageFormat::WebP, (3000, 3000), 1_000, &CompressionConfig::default());
        assert_eq!(p.encoding, Some(Encoding::WebPLossless));
        let lossy = CompressionConfig {
            lossless_palette_sources: false,
            ..Default::default()
        };
        let p = plan(ImageFormat::WebP, (3000, 3000), 1_000, &lossy);
        assert_eq!(p.encoding, Some(Encoding::WebPLossy { quality: 90 }));
    }

    #[test]
    fn unwritable_format_is_never_resized() {
        let p = plan(ImageFormat::Bmp, (5000, 5000), 1_000, &CompressionConfig::default());
        assert!(p.is_noop());
    }

    #[test]
    fn fit_within_respects_aspect_and_never_upscales() {
        let config = CompressionConfig {
            max_width: 200,
            max_height: 200,
            ..Default::default()
        };
        assert_eq!(fit_within((100, 50), &config), None);
        assert_eq!(fit_within((400, 100), &config), Some((200, 50)));
        assert_eq!(fit_within((100, 1000), &config), Some((20, 200)));

        let stretch = CompressionConfig {
            preserve_aspect_ratio: false,
            ..config
        };
        assert_eq!(fit_within((400, 100), &stretch), Some((200, 100)));
    }

    // apply

    #[test]
    fn lossy_conversion_replaces_large_png() {
        let dir = tempfile::tempdir().unwrap();
        let src = save_png(dir.path(), "photo.png", &noise(256, 256));
        let config = CompressionConfig {
            lossless_threshold_bytes: 1_000,
            ..convert_to(TargetFormat::WebP)
        };

        let out = apply(&src, "2024/01/01/photo.png", &config, &NullSink);

        assert_eq!(
            out.action,
            TranscodeAction::Converted {
                encoding: Encoding::WebPLossy { quality: 90 },
                resized: false
            }
        );
        assert_eq!(out.final_relative, "2024/01/01/photo.webp");
        assert_eq!(out.final_path, dir.path().join("photo.webp"));
        assert!(out.final_path.exists());
        assert!(!src.exists(), "source should be removed after conversion");
        assert!(out.bytes_after < out.bytes_before);
    }

    /// Four colours differing only in red, scattered at random: PNG pays
    /// for every byte of the RGB triple, lossless WebP only for the red
    /// channel.
    fn four_colour_scatter(w: u32, h: u32) -> DynamicImage {
        let mut state: u32 = 0x0bad_cafe;
        let img = RgbImage::from_fn(w, h, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let red = [20, 90, 160, 230][(state >> 30) as usize];
            Rgb([red, 50, 50])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn small_palette_png_is_converted_losslessly() {
        let dir = tempfile::tempdir().unwrap();
        let img = four_colour_scatter(256, 256);
        let src = save_png(dir.path(), "logo.png", &img);
        let config = CompressionConfig {
            min_savings_ratio: 0.0,
            ..convert_to(TargetFormat::WebP)
        };
        assert!(std::fs::metadata(&src).unwrap().len() < config.lossless_threshold_bytes);

        let out = apply(&src, "2024/05/01/logo.png", &config, &NullSink);

        assert!(
            matches!(
                out.action,
                TranscodeAction::Converted {
                    encoding: Encoding::WebPLossless,
                    resized: false
                }
            ),
            "{:?}",
            out.action
        );
        assert_eq!(out.final_relative, "2024/05/01/logo.webp");
        assert_eq!(out.final_path, dir.path().join("logo.webp"));
        assert!(!src.exists());
        assert!(out.bytes_after < out.bytes_before);

        let back = image::open(&out.final_path).unwrap().to_rgba8();
        assert_eq!(back, img.to_rgba8());
    }

    #[test]
    fn insufficient_saving_reverts_to_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let src = save_png(dir.path(), "photo.png", &noise(128, 128));
        let original = std::fs::read(&src).unwrap();
        let config = CompressionConfig {
            min_savings_ratio: 0.99,
            lossless_threshold_bytes: 0,
            ..convert_to(TargetFormat::WebP)
        };

        let out = apply(&src, "photo.png", &config, &NullSink);

        assert!(matches!(out.action, TranscodeAction::Reverted { .. }));
        assert_eq!(out.final_path, src);
        assert_eq!(out.final_relative, "photo.png");
        assert_eq!(std::fs::read(&src).unwrap(), original);
        assert!(!dir.path().join("photo.webp").exists());
    }

    #[test]
    fn oversized_image_is_resized_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let src = save_png(dir.path(), "wide.png", &noise(400, 100));
        let config = CompressionConfig {
            max_width: 200,
            max_height: 200,
            ..Default::default()
        };

        let out = apply(&src, "wide.png", &config, &NullSink);

        assert_eq!(
            out.action,
            TranscodeAction::Resized {
                width: 200,
                height: 50
            }
        );
        assert_eq!(out.final_path, src);
        let (w, h) = image::image_dimensions(&src).unwrap();
        assert_eq!((w, h), (200, 50));
    }

    #[test]
    fn small_image_without_conversion_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let src = save_png(dir.path(), "tiny.png", &noise(16, 16));
        let out = apply(&src, "tiny.png", &CompressionConfig::default(), &NullSink);
        assert_eq!(out.action, TranscodeAction::Unchanged);
        assert_eq!(out.bytes_before, out.bytes_after);
    }

    #[test]
    fn undecodable_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.png");
        std::fs::write(&src, b"<html>definitely not a png</html>").unwrap();
        let sink = MemorySink::new();

        let out = apply(&src, "broken.png", &convert_to(TargetFormat::WebP), &sink);

        assert!(matches!(out.action, TranscodeAction::Fallback { .. }));
        assert_eq!(out.final_path, src);
        assert_eq!(
            std::fs::read(&src).unwrap(),
            b"<html>definitely not a png</html>"
        );
        assert_eq!(sink.matching("TRANSCODE", LogLevel::Warn).len(), 1);
    }

    #[test]
    fn svg_falls_back_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("icon.svg");
        std::fs::write(&src, "<svg xmlns=\"http://www.w3.org/2000/svg\"/>").unwrap();
        let out = apply(&src, "icon.svg", &convert_to(TargetFormat::WebP), &NullSink);
        assert!(matches!(out.action, TranscodeAction::Fallback { .. }));
        assert!(src.exists());
    }

    #[tokio::test]
    async fn transcode_runs_on_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let src = save_png(dir.path(), "tiny.png", &noise(8, 8));
        let out = transcode(
            src.clone(),
            "tiny.png".into(),
            CompressionConfig::default(),
            Arc::new(NullSink),
        )
        .await;
        assert_eq!(out.action, TranscodeAction::Unchanged);
        assert_eq!(out.final_path, src);
    }
}
