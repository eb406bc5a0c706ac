//! Reference extraction: find every remote image a document points at.
//!
//! Three independent scanners, each confined to its own surface:
//!
//! | Surface | Scope | Category |
//! |---------|-------|----------|
//! | `![alt](url)` | document body | [`ReferenceCategory::Standard`] |
//! | `cover:` / `banner:` / … | front-matter block only | [`ReferenceCategory::FrontMatterCover`] |
//! | `<img src="url">` | document body | [`ReferenceCategory::HtmlTag`] |
//!
//! The body is everything after the front-matter block, so a cover URL is
//! never mistaken for an inline image and vice versa. Scanner output is
//! merged by byte offset and deduplicated by URL; the first occurrence
//! decides category and alt text.
//!
//! Extraction never fails. An unterminated front-matter block yields no
//! cover reference and a warning on the sink.

use crate::sink::LogSink;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Range;

/// Front-matter fields that may carry a cover image, in priority order.
pub const COVER_FIELDS: [&str; 5] = ["cover", "banner", "image", "thumbnail", "featured_image"];

/// Alt text recorded for front-matter covers.
pub const COVER_ALT: &str = "cover";

/// Alt text recorded for `<img>` tags.
pub const HTML_ALT: &str = "html-image";

/// Where in the document a reference was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceCategory {
    /// Inline Markdown image, `![alt](url)`.
    Standard,
    /// A cover field in the front-matter block.
    FrontMatterCover,
    /// An HTML `<img>` tag.
    HtmlTag,
}

/// A remote image mention, as found by one of the scanners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub alt_text: String,
    pub original_url: String,
    pub category: ReferenceCategory,
    /// Byte offset of the match in the document; used for ordering only.
    pub offset: usize,
}

/// Location of the front-matter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontMatter {
    /// The document does not open with `---`.
    Absent,
    /// Opening delimiter without a closing one.
    Unclosed,
    /// A complete block.
    Closed {
        /// Lines between the two delimiters.
        content: Range<usize>,
        /// Offset just past the closing delimiter line; the body starts here.
        end: usize,
    },
}

impl FrontMatter {
    /// Offset where the document body starts.
    pub fn body_start(&self) -> usize {
        match self {
            FrontMatter::Closed { end, .. } => *end,
            _ => 0,
        }
    }
}

/// Locate the leading `---` … `---` block.
pub fn locate_front_matter(doc: &str) -> FrontMatter {
    let mut lines = line_spans(doc);
    match lines.next() {
        Some((_, line)) if is_delimiter(line) => {}
        _ => return FrontMatter::Absent,
    }
    let content_start = doc.find('\n').map(|i| i + 1).unwrap_or(doc.len());
    for (start, line) in lines {
        if is_delimiter(line) {
            return FrontMatter::Closed {
                content: content_start..start,
                end: start + line.len(),
            };
        }
    }
    FrontMatter::Unclosed
}

/// One `key: value` line inside the front matter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldLine<'a> {
    pub key: &'a str,
    /// Unquoted value token.
    pub value: &'a str,
    /// Absolute byte range of `value` in the document.
    pub value_range: Range<usize>,
}

/// Iterate over top-level `key: value` lines of the block in `content`.
pub(crate) fn field_lines(doc: &str, content: Range<usize>) -> Vec<FieldLine<'_>> {
    let base = content.start;
    line_spans(&doc[content])
        .filter_map(|(start, line)| {
            let line = line.trim_end_matches(['\n', '\r']);
            let colon = line.find(':')?;
            let key = &line[..colon];
            if key.is_empty() || key.starts_with(char::is_whitespace) {
                return None;
            }
            let rest = &line[colon + 1..];
            let lead = rest.len() - rest.trim_start().len();
            let mut value = rest.trim_start();
            let mut value_start = base + start + colon + 1 + lead;
            if let Some(q) = value.chars().next().filter(|c| *c == '"' || *c == '\'') {
                value = &value[1..];
                value_start += 1;
                if let Some(close) = value.find(q) {
                    value = &value[..close];
                }
                let inner_lead = value.len() - value.trim_start().len();
                value = value.trim_start();
                value_start += inner_lead;
            }
            let value = value.split_whitespace().next().unwrap_or("");
            Some(FieldLine {
                key,
                value,
                value_range: value_start..value_start + value.len(),
            })
        })
        .collect()
}

/// Scan every surface and return all references in document order,
/// duplicates included.
pub fn scan_references(doc: &str, sink: &dyn LogSink) -> Vec<Reference> {
    let front = locate_front_matter(doc);
    let body_start = front.body_start();

    let mut refs = Vec::new();
    match &front {
        FrontMatter::Closed { content, .. } => refs.extend(scan_cover(doc, content.clone())),
        FrontMatter::Unclosed => sink.warn(
            "EXTRACT",
            "front matter has no closing '---'; skipping cover fields".to_string(),
        ),
        FrontMatter::Absent => {}
    }
    refs.extend(scan_inline(doc, body_start));
    refs.extend(scan_html(doc, body_start));

    refs.sort_by_key(|r| r.offset);
    refs
}

/// Scan and deduplicate by URL; first occurrence wins.
pub fn extract_references(doc: &str, sink: &dyn LogSink) -> Vec<Reference> {
    let mut seen = HashSet::new();
    let refs: Vec<Reference> = scan_references(doc, sink)
        .into_iter()
        .filter(|r| seen.insert(r.original_url.clone()))
        .collect();
    sink.info(
        "EXTRACT",
        format!("found {} remote image reference(s)", refs.len()),
    );
    refs
}

/// `true` for absolute `http`/`https` URLs with a host.
pub fn is_remote_url(s: &str) -> bool {
    match reqwest::Url::parse(s) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some(),
        Err(_) => false,
    }
}

// ── Scanners ────────────────────────────────────────────────────────────────

fn scan_cover(doc: &str, content: Range<usize>) -> Option<Reference> {
    let fields = field_lines(doc, content);
    COVER_FIELDS.iter().find_map(|name| {
        fields
            .iter()
            .find(|f| f.key == *name && is_remote_url(f.value))
            .map(|f| Reference {
                alt_text: COVER_ALT.to_string(),
                original_url: f.value.to_string(),
                category: ReferenceCategory::FrontMatterCover,
                offset: f.value_range.start,
            })
    })
}

pub(crate) static RE_INLINE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)\s]+)\)").unwrap());

fn scan_inline(doc: &str, body_start: usize) -> Vec<Reference> {
    RE_INLINE_IMAGE
        .captures_iter(&doc[body_start..])
        .filter(|c| is_remote_url(&c[2]))
        .map(|c| Reference {
            alt_text: c[1].to_string(),
            original_url: c[2].to_string(),
            category: ReferenceCategory::Standard,
            offset: body_start + c.get(0).map_or(0, |m| m.start()),
        })
        .collect()
}

pub(crate) static RE_IMG_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<img\b[^>]*>").unwrap());

static RE_SRC_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\ssrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
});

/// Range of the `src` value inside `tag`, quotes excluded.
pub(crate) fn src_value(tag: &str) -> Option<Range<usize>> {
    let caps = RE_SRC_ATTR.captures(tag)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.range())
}

fn scan_html(doc: &str, body_start: usize) -> Vec<Reference> {
    let body = &doc[body_start..];
    RE_IMG_TAG
        .find_iter(body)
        .filter_map(|tag| {
            let src = src_value(tag.as_str())?;
            let url = &tag.as_str()[src];
            is_remote_url(url).then(|| Reference {
                alt_text: HTML_ALT.to_string(),
                original_url: url.to_string(),
                category: ReferenceCategory::HtmlTag,
                offset: body_start + tag.start(),
            })
        })
        .collect()
}

// ── Line helpers ────────────────────────────────────────────────────────────

/// Lines with their start offsets, terminators included.
fn line_spans(s: &str) -> impl Iterator<Item = (usize, &str)> {
    s.split_inclusive('\n').scan(0usize, |pos, line| {
        let start = *pos;
        *pos += line.len();
        Some((start, line))
    })
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end_matches(['\n', '\r']).trim_end() == "---"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{LogLevel, MemorySink, NullSink};

    fn urls(refs: &[Reference]) -> Vec<&str> {
        refs.iter().map(|r| r.original_url.as_str()).collect()
    }

    #[test]
    fn three_surfaces_in_document_order() {
        let doc = "---\ntitle: t\ncover: https://example.com/a.png\n---\n\n\
                   Intro ![x](https://example.com/b.jpg)\n\n\
                   <img class=\"wide\" src=\"https://example.com/c.png\">\n";
        let refs = extract_references(doc, &NullSink);
        assert_eq!(
            urls(&refs),
            vec![
                "https://example.com/a.png",
                "https://example.com/b.jpg",
                "https://example.com/c.png"
            ]
        );
        assert_eq!(refs[0].category, ReferenceCategory::FrontMatterCover);
        assert_eq!(refs[0].alt_text, COVER_ALT);
        assert_eq!(refs[1].category, ReferenceCategory::Standard);
        assert_eq!(refs[1].alt_text, "x");
        assert_eq!(refs[2].category, ReferenceCategory::HtmlTag);
        assert_eq!(refs[2].alt_text, HTML_ALT);
    }

    #[test]
    fn duplicate_url_keeps_first_category() {
        let doc = "![first](https://cdn.test/p.png)\n<img src=\"https://cdn.test/p.png\">";
        let refs = extract_references(doc, &NullSink);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].category, ReferenceCategory::Standard);
        assert_eq!(refs[0].alt_text, "first");

        let doc = "<img src='https://cdn.test/p.png'>\n![later](https://cdn.test/p.png)";
        let refs = extract_references(doc, &NullSink);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].category, ReferenceCategory::HtmlTag);
    }

    #[test]
    fn scan_keeps_duplicates() {
        let doc = "![a](https://cdn.test/p.png) ![b](https://cdn.test/p.png)";
        assert_eq!(scan_references(doc, &NullSink).len(), 2);
        assert_eq!(extract_references(doc, &NullSink).len(), 1);
    }

    #[test]
    fn relative_and_non_http_urls_ignored() {
        let doc = "![a](/images/local.png) ![b](data:image/png;base64,AAAA) \
                   ![c](ftp://host/x.png) <img src=\"img/y.png\">";
        assert!(extract_references(doc, &NullSink).is_empty());
    }

    #[test]
    fn cover_priority_order() {
        let doc = "---\nbanner: https://cdn.test/banner.png\ncover: https://cdn.test/cover.png\n---\nbody";
        let refs = extract_references(doc, &NullSink);
        assert_eq!(urls(&refs), vec!["https://cdn.test/cover.png"]);
    }

    #[test]
    fn cover_skips_non_url_fields() {
        let doc = "---\ncover: local.png\nthumbnail: \"https://cdn.test/t.png\"\n---\n";
        let refs = extract_references(doc, &NullSink);
        assert_eq!(urls(&refs), vec!["https://cdn.test/t.png"]);
    }

    #[test]
    fn unclosed_front_matter_yields_no_cover() {
        let sink = MemorySink::new();
        let doc = "---\ncover: https://cdn.test/c.png\n\n![x](https://cdn.test/x.png)";
        let refs = extract_references(doc, &sink);
        assert!(refs
            .iter()
            .all(|r| r.category != ReferenceCategory::FrontMatterCover));
        assert_eq!(sink.matching("EXTRACT", LogLevel::Warn).len(), 1);
    }

    #[test]
    fn cover_fields_outside_block_are_not_covers() {
        let doc = "Some text\ncover: https://cdn.test/c.png\n";
        assert!(extract_references(doc, &NullSink).is_empty());
    }

    #[test]
    fn inline_syntax_inside_front_matter_ignored() {
        let doc = "---\nsummary: ![x](https://cdn.test/x.png)\n---\nbody";
        assert!(extract_references(doc, &NullSink).is_empty());
    }

    #[test]
    fn front_matter_crlf() {
        let doc = "---\r\ncover: https://cdn.test/c.png\r\n---\r\nbody";
        match locate_front_matter(doc) {
            FrontMatter::Closed { end, .. } => assert_eq!(&doc[end..], "body"),
            other => panic!("expected closed block, got {other:?}"),
        }
        assert_eq!(extract_references(doc, &NullSink).len(), 1);
    }

    #[test]
    fn data_src_is_not_src() {
        let doc = "<img data-src=\"https://cdn.test/lazy.png\" src=\"https://cdn.test/real.png\">";
        let refs = extract_references(doc, &NullSink);
        assert_eq!(urls(&refs), vec!["https://cdn.test/real.png"]);
    }

    #[test]
    fn unquoted_src_attribute() {
        let doc = "<IMG width=10 src=https://cdn.test/u.gif alt=x>";
        let refs = extract_references(doc, &NullSink);
        assert_eq!(urls(&refs), vec!["https://cdn.test/u.gif"]);
    }

    #[test]
    fn field_value_range_points_at_url() {
        let doc = "---\ncover: 'https://cdn.test/c.png'\n---\n";
        let content = match locate_front_matter(doc) {
            FrontMatter::Closed { content, .. } => content,
            other => panic!("unexpected {other:?}"),
        };
        let fields = field_lines(doc, content);
        assert_eq!(fields.len(), 1);
        assert_eq!(&doc[fields[0].value_range.clone()], "https://cdn.test/c.png");
    }
}
