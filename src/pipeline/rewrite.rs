//! Reference rewriting: point localized references at their local links.
//!
//! The same three surfaces the extractor reads are scanned again and every
//! URL found in `links` is replaced in place:
//!
//! - inline images: only the `(url)` part; alt text and surrounding text stay
//! - front-matter cover fields: the value, quotes kept
//! - `<img>` tags: the `src` value, quotes and other attributes kept
//!
//! A URL is replaced on every surface it appears on, not only the one it
//! was first extracted from. URLs absent from `links` (failed fetches) are
//! left as they are. Rewriting a rewritten document changes nothing because
//! local links are never keys of `links`.

use crate::pipeline::extract::{
    field_lines, locate_front_matter, src_value, FrontMatter, COVER_FIELDS, RE_IMG_TAG,
    RE_INLINE_IMAGE,
};
use crate::sink::LogSink;
use std::collections::HashMap;
use std::ops::Range;

/// Replace every localized URL in `doc`. `links` maps remote URL → local link.
pub fn rewrite_document(
    doc: &str,
    links: &HashMap<String, String>,
    sink: &dyn LogSink,
) -> String {
    if links.is_empty() {
        return doc.to_string();
    }

    let mut edits = collect_edits(doc, links);
    edits.sort_by_key(|(range, _)| range.start);

    let mut out = String::with_capacity(doc.len());
    let mut cursor = 0;
    for (range, link) in &edits {
        // Surfaces are disjoint; an overlapping edit would be a scanner bug.
        if range.start < cursor {
            continue;
        }
        out.push_str(&doc[cursor..range.start]);
        out.push_str(link);
        cursor = range.end;
    }
    out.push_str(&doc[cursor..]);

    sink.info(
        "REWRITE",
        format!(
            "replaced {} occurrence(s) of {} localized URL(s)",
            edits.len(),
            links.len()
        ),
    );
    out
}

fn collect_edits<'l>(
    doc: &str,
    links: &'l HashMap<String, String>,
) -> Vec<(Range<usize>, &'l str)> {
    let mut edits = Vec::new();
    let front = locate_front_matter(doc);
    let body_start = front.body_start();

    if let FrontMatter::Closed { content, .. } = &front {
        for field in field_lines(doc, content.clone()) {
            if !COVER_FIELDS.contains(&field.key) {
                continue;
            }
            if let Some(link) = links.get(field.value) {
                edits.push((field.value_range, link.as_str()));
            }
        }
    }

    let body = &doc[body_start..];
    for caps in RE_INLINE_IMAGE.captures_iter(body) {
        let Some(url) = caps.get(2) else { continue };
        if let Some(link) = links.get(url.as_str()) {
            let range = body_start + url.start()..body_start + url.end();
            edits.push((range, link.as_str()));
        }
    }

    for tag in RE_IMG_TAG.find_iter(body) {
        let Some(src) = src_value(tag.as_str()) else {
            continue;
        };
        if let Some(link) = links.get(&tag.as_str()[src.clone()]) {
            let start = body_start + tag.start();
            edits.push((start + src.start..start + src.end, link.as_str()));
        }
    }

    edits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullSink;

    fn links(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn rewrites_all_three_surfaces() {
        let doc = "---\ntitle: t\ncover: \"https://example.com/a.png\"\n---\n\
                   ![x](https://example.com/b.jpg)\n\
                   <img class=\"w\" src='https://example.com/c.png' alt=\"c\">\n";
        let map = links(&[
            ("https://example.com/a.png", "/images/a.png"),
            ("https://example.com/b.jpg", "/images/b.jpg"),
            ("https://example.com/c.png", "/images/c.webp"),
        ]);
        let out = rewrite_document(doc, &map, &NullSink);
        assert_eq!(
            out,
            "---\ntitle: t\ncover: \"/images/a.png\"\n---\n\
             ![x](/images/b.jpg)\n\
             <img class=\"w\" src='/images/c.webp' alt=\"c\">\n"
        );
    }

    #[test]
    fn unmapped_urls_are_untouched() {
        let doc = "![ok](https://cdn.test/ok.png) ![bad](https://cdn.test/bad.png)";
        let map = links(&[("https://cdn.test/ok.png", "/images/ok.png")]);
        let out = rewrite_document(doc, &map, &NullSink);
        assert_eq!(out, "![ok](/images/ok.png) ![bad](https://cdn.test/bad.png)");
    }

    #[test]
    fn every_occurrence_is_replaced() {
        let doc = "![a](https://cdn.test/p.png)\n![b](https://cdn.test/p.png)\n<img src=\"https://cdn.test/p.png\">";
        let map = links(&[("https://cdn.test/p.png", "/images/p.png")]);
        let out = rewrite_document(doc, &map, &NullSink);
        assert!(!out.contains("cdn.test"));
        assert_eq!(out.matches("/images/p.png").count(), 3);
        assert!(out.contains("![a](/images/p.png)"));
        assert!(out.contains("![b](/images/p.png)"));
    }

    #[test]
    fn rewriting_twice_is_idempotent() {
        let doc = "---\nbanner: https://cdn.test/b.png\n---\n![x](https://cdn.test/x.png)";
        let map = links(&[
            ("https://cdn.test/b.png", "/images/b.png"),
            ("https://cdn.test/x.png", "/images/x.png"),
        ]);
        let once = rewrite_document(doc, &map, &NullSink);
        let twice = rewrite_document(&once, &map, &NullSink);
        assert_eq!(once, twice);
    }

    #[test]
    fn non_cover_fields_are_not_rewritten() {
        let doc = "---\nsource: https://cdn.test/x.png\ncover: https://cdn.test/x.png\n---\n";
        let map = links(&[("https://cdn.test/x.png", "/images/x.png")]);
        let out = rewrite_document(doc, &map, &NullSink);
        assert_eq!(
            out,
            "---\nsource: https://cdn.test/x.png\ncover: /images/x.png\n---\n"
        );
    }

    #[test]
    fn url_as_plain_text_is_not_rewritten() {
        let doc = "See https://cdn.test/x.png and ![x](https://cdn.test/x.png)";
        let map = links(&[("https://cdn.test/x.png", "/images/x.png")]);
        let out = rewrite_document(doc, &map, &NullSink);
        assert_eq!(out, "See https://cdn.test/x.png and ![x](/images/x.png)");
    }

    #[test]
    fn empty_map_returns_input() {
        let doc = "![x](https://cdn.test/x.png)";
        assert_eq!(rewrite_document(doc, &HashMap::new(), &NullSink), doc);
    }
}
