//! Local path generation: URL → `YYYY/MM/DD/<sanitized-name>.<ext>`.
//!
//! The generated path is a pure function of the URL and the run's clock,
//! so repeated runs on the same day land on the same file and can skip the
//! download. Path generation cannot fail: anything unparsable gets a
//! timestamp-based name in the same date bucket.

use crate::config::LocalizeConfig;
use crate::pipeline::extract::{Reference, ReferenceCategory};
use crate::sink::LogSink;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Extensions accepted as-is from the URL path.
pub const IMAGE_EXTENSIONS: [&str; 11] = [
    "jpg", "jpeg", "png", "gif", "webp", "avif", "bmp", "svg", "tif", "tiff", "ico",
];

/// Extension used when neither the path nor a `format` parameter has one.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Longest sanitized stem kept, in bytes (the stem is ASCII by then).
pub const MAX_STEM_LEN: usize = 64;

/// A reference with its local target assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub alt_text: String,
    pub original_url: String,
    pub category: ReferenceCategory,
    /// Path below the images root, `/`-separated.
    pub local_relative_path: String,
    /// `images_root` joined with the relative path.
    pub local_absolute_path: PathBuf,
}

/// `YYYY/MM/DD` for the given time.
pub fn date_bucket(at: NaiveDateTime) -> String {
    at.format("%Y/%m/%d").to_string()
}

/// Derive the relative path for `url`.
pub fn relative_path(url: &str, at: NaiveDateTime) -> String {
    let bucket = date_bucket(at);
    match file_name_for(url) {
        Some(name) => format!("{bucket}/{name}"),
        None => fallback_path(at),
    }
}

/// Timestamp-based name used when the URL cannot be parsed.
pub fn fallback_path(at: NaiveDateTime) -> String {
    format!(
        "{}/image_{}.{}",
        date_bucket(at),
        at.and_utc().timestamp_millis(),
        DEFAULT_EXTENSION
    )
}

fn file_name_for(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()
        .and_then(|mut s| s.next_back())
        .unwrap_or("");

    let (stem, ext) = match segment.rsplit_once('.') {
        Some((stem, ext)) if is_image_extension(ext) => (stem, ext.to_ascii_lowercase()),
        _ => (
            segment,
            format_param(&parsed).unwrap_or_else(|| DEFAULT_EXTENSION.to_string()),
        ),
    };

    let mut stem = sanitize_filename(stem);
    if stem.is_empty() {
        stem = "image".to_string();
    }
    Some(format!("{stem}.{ext}"))
}

fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext))
}

/// Extension from a `?format=` query parameter, e.g. Unsplash-style URLs.
fn format_param(url: &reqwest::Url) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == "format")
        .map(|(_, v)| v.to_ascii_lowercase())
        .filter(|v| !v.is_empty() && v.len() <= 5 && v.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Reduce `name` to `[A-Za-z0-9._-]`, collapse `_` runs, trim separators
/// from both ends and cap the length.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches(|c| c == '_' || c == '.');
    let capped = &trimmed[..trimmed.len().min(MAX_STEM_LEN)];
    capped.trim_end_matches(|c| c == '_' || c == '.').to_string()
}

/// Assign a local target to every reference.
///
/// Distinct URLs that map to the same file name get `-1`, `-2`, … suffixes
/// so two references never share a target within one run. When conversion
/// is on, a reference also claims its converted sibling (`pic.png` claims
/// `pic.webp`), so a transcode can never land on another reference's file.
pub fn assign_paths(
    refs: Vec<Reference>,
    at: NaiveDateTime,
    config: &LocalizeConfig,
    sink: &dyn LogSink,
) -> Vec<ImageReference> {
    let sibling_ext = config.converted_extension();
    let mut used: HashSet<String> = HashSet::new();
    refs.into_iter()
        .map(|r| {
            let base = relative_path(&r.original_url, at);
            let relative = disambiguate(&base, sibling_ext, &mut used);
            if relative != base {
                sink.debug(
                    "PATH",
                    format!("'{}' collides with another reference; using {relative}", base),
                );
            }
            let absolute = absolute_path(config, &relative);
            ImageReference {
                alt_text: r.alt_text,
                original_url: r.original_url,
                category: r.category,
                local_relative_path: relative,
                local_absolute_path: absolute,
            }
        })
        .collect()
}

/// `images_root` joined with a `/`-separated relative path.
pub fn absolute_path(config: &LocalizeConfig, relative: &str) -> PathBuf {
    relative
        .split('/')
        .fold(config.images_root.clone(), |acc, part| acc.join(part))
}

/// Same relative path with its extension replaced.
pub fn with_extension(relative: &str, ext: &str) -> String {
    let (dir, name) = match relative.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, relative),
    };
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    match dir {
        Some(dir) => format!("{dir}/{stem}.{ext}"),
        None => format!("{stem}.{ext}"),
    }
}

/// First of `base`, `<head>-1.<ext>`, `<head>-2.<ext>`, … whose name and
/// converted sibling are both unclaimed; claims both.
fn disambiguate(base: &str, sibling_ext: Option<&str>, used: &mut HashSet<String>) -> String {
    let claims = |candidate: &str| {
        let mut names = vec![candidate.to_string()];
        if let Some(ext) = sibling_ext {
            let sibling = with_extension(candidate, ext);
            if sibling != candidate {
                names.push(sibling);
            }
        }
        names
    };

    let (head, ext) = base.rsplit_once('.').unwrap_or((base, DEFAULT_EXTENSION));
    let chosen = std::iter::once(base.to_string())
        .chain((1..).map(|n| format!("{head}-{n}.{ext}")))
        .find(|candidate| claims(candidate).iter().all(|name| !used.contains(name)))
        .unwrap_or_else(|| base.to_string());
    used.extend(claims(&chosen));
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressionConfig;
    use crate::sink::NullSink;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn is_sanitized(path: &str) -> bool {
        path.split('/').last().unwrap().chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')
        })
    }

    #[test]
    fn keeps_known_extension() {
        assert_eq!(
            relative_path("https://cdn.test/a/b/Photo.PNG", at()),
            "2024/03/07/Photo.png"
        );
    }

    #[test]
    fn format_param_supplies_extension() {
        assert_eq!(
            relative_path("https://images.test/photo-123?w=800&format=webp", at()),
            "2024/03/07/photo-123.webp"
        );
    }

    #[test]
    fn default_extension_when_missing() {
        assert_eq!(
            relative_path("https://cdn.test/render.php?id=4", at()),
            "2024/03/07/render.php.jpg"
        );
        assert_eq!(relative_path("https://cdn.test/", at()), "2024/03/07/image.jpg");
    }

    #[test]
    fn sanitizes_unsafe_characters() {
        let p = relative_path("https://cdn.test/my%20pic%20(1).jpg", at());
        assert_eq!(p, "2024/03/07/my_20pic_20_1.jpg");
        assert!(is_sanitized(&p));
    }

    #[test]
    fn caps_long_names() {
        let long = "a".repeat(300);
        let p = relative_path(&format!("https://cdn.test/{long}.png"), at());
        let name = p.rsplit('/').next().unwrap();
        assert_eq!(name.len(), MAX_STEM_LEN + ".png".len());
    }

    #[test]
    fn deterministic_for_fixed_date() {
        let url = "https://cdn.test/x/y/z.gif?v=2";
        assert_eq!(relative_path(url, at()), relative_path(url, at()));
    }

    #[test]
    fn unparsable_url_falls_back_to_timestamp() {
        let p = relative_path("not a url", at());
        assert!(p.starts_with("2024/03/07/image_"), "got {p}");
        assert!(p.ends_with(".jpg"));
        assert!(is_sanitized(&p));
    }

    #[test]
    fn sanitize_filename_rules() {
        assert_eq!(sanitize_filename("__a  b__"), "a_b");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename("照片"), "");
        assert_eq!(sanitize_filename("ok-name_1.v2"), "ok-name_1.v2");
    }

    #[test]
    fn colliding_names_get_suffixes() {
        let config = LocalizeConfig::default();
        let refs = ["https://a.test/one/pic.png", "https://b.test/two/pic.png", "https://c.test/pic.png"]
            .iter()
            .enumerate()
            .map(|(i, u)| Reference {
                alt_text: String::new(),
                original_url: u.to_string(),
                category: ReferenceCategory::Standard,
                offset: i,
            })
            .collect();
        let assigned = assign_paths(refs, at(), &config, &NullSink);
        let rel: Vec<_> = assigned.iter().map(|r| r.local_relative_path.as_str()).collect();
        assert_eq!(
            rel,
            vec!["2024/03/07/pic.png", "2024/03/07/pic-1.png", "2024/03/07/pic-2.png"]
        );
        assert_eq!(
            assigned[0].local_absolute_path,
            PathBuf::from("images").join("2024").join("03").join("07").join("pic.png")
        );
    }

    fn standard(urls: &[&str]) -> Vec<Reference> {
        urls.iter()
            .enumerate()
            .map(|(i, u)| Reference {
                alt_text: String::new(),
                original_url: u.to_string(),
                category: ReferenceCategory::Standard,
                offset: i,
            })
            .collect()
    }

    #[test]
    fn converted_sibling_names_are_reserved() {
        let config = LocalizeConfig::builder()
            .compression(CompressionConfig {
                convert_to_target_format: true,
                ..CompressionConfig::default()
            })
            .build()
            .unwrap();
        let assigned = assign_paths(
            standard(&["https://a.test/y/pic.webp", "https://a.test/x/pic.png"]),
            at(),
            &config,
            &NullSink,
        );
        let rel: Vec<_> = assigned.iter().map(|r| r.local_relative_path.as_str()).collect();
        assert_eq!(rel, vec!["2024/03/07/pic.webp", "2024/03/07/pic-1.png"]);

        let reversed = assign_paths(
            standard(&["https://a.test/x/pic.png", "https://a.test/y/pic.webp"]),
            at(),
            &config,
            &NullSink,
        );
        let rel: Vec<_> = reversed.iter().map(|r| r.local_relative_path.as_str()).collect();
        assert_eq!(rel, vec!["2024/03/07/pic.png", "2024/03/07/pic-1.webp"]);
    }

    #[test]
    fn siblings_are_not_reserved_without_conversion() {
        let config = LocalizeConfig::builder()
            .compress(false)
            .compression(CompressionConfig {
                convert_to_target_format: true,
                ..CompressionConfig::default()
            })
            .build()
            .unwrap();
        let assigned = assign_paths(
            standard(&["https://a.test/y/pic.webp", "https://a.test/x/pic.png"]),
            at(),
            &config,
            &NullSink,
        );
        let rel: Vec<_> = assigned.iter().map(|r| r.local_relative_path.as_str()).collect();
        assert_eq!(rel, vec!["2024/03/07/pic.webp", "2024/03/07/pic.png"]);
    }

    #[test]
    fn with_extension_swaps_suffix() {
        assert_eq!(with_extension("2024/03/07/a.png", "webp"), "2024/03/07/a.webp");
        assert_eq!(with_extension("a", "webp"), "a.webp");
    }
}
