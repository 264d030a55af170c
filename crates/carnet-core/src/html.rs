//! Image-reference scanning for rich-text note bodies.
//!
//! Rich bodies are HTML fragments produced by the editor. The reconciler
//! needs the set of image URLs a body references, so it can tell which
//! stored attachments are still in use. Scanning runs on a streaming
//! `quick-xml` reader in lenient mode rather than pattern matching, so
//! attribute order, quoting style, and unclosed elements do not matter.

use std::collections::HashSet;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Extract the set of image URLs referenced by an HTML fragment.
///
/// Only `<img>` elements are counted (any case, open or self-closed), and
/// for each element the first `src` attribute wins. Duplicate URLs dedupe
/// through set semantics. A parse error ends the scan at that point; every
/// URL collected before it is kept.
pub fn image_sources(html: &str) -> HashSet<String> {
    let mut reader = Reader::from_str(html);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut sources = HashSet::new();
    let mut last_pos = reader.buffer_position();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref().eq_ignore_ascii_case(b"img") {
                    if let Some(src) = first_src_attribute(&e) {
                        sources.insert(src);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => {
                // Tolerate malformed markup: skip past it when the reader
                // advanced, stop once it can make no further progress.
                let pos = reader.buffer_position();
                if pos == last_pos {
                    break;
                }
            }
        }
        last_pos = reader.buffer_position();
    }

    sources
}

/// First `src` attribute of an element, unescaped; `None` when absent.
fn first_src_attribute(element: &BytesStart<'_>) -> Option<String> {
    for attr in element.attributes().with_checks(false).flatten() {
        if attr.key.local_name().as_ref().eq_ignore_ascii_case(b"src") {
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                // Undecodable entity in the value: fall back to the raw bytes.
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            return Some(value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_src_from_simple_body() {
        let srcs = image_sources(r#"<p>hello</p><img src="/attachments/a1">"#);
        assert_eq!(srcs.len(), 1);
        assert!(srcs.contains("/attachments/a1"));
    }

    #[test]
    fn self_closed_and_open_forms_both_count() {
        let srcs = image_sources(r#"<img src="/u1"/><img src="/u2"><p>x</p>"#);
        assert_eq!(srcs.len(), 2);
        assert!(srcs.contains("/u1"));
        assert!(srcs.contains("/u2"));
    }

    #[test]
    fn element_and_attribute_names_are_case_insensitive() {
        let srcs = image_sources(r#"<IMG SRC="/shouting.png">"#);
        assert!(srcs.contains("/shouting.png"));
    }

    #[test]
    fn duplicate_urls_dedupe() {
        let srcs = image_sources(r#"<img src="/same"><img src="/same">"#);
        assert_eq!(srcs.len(), 1);
    }

    #[test]
    fn first_src_attribute_wins() {
        let srcs = image_sources(r#"<img src="/first" src="/second">"#);
        assert!(srcs.contains("/first"));
        assert!(!srcs.contains("/second"));
    }

    #[test]
    fn non_img_elements_are_ignored() {
        let srcs = image_sources(r#"<script src="/evil.js"></script><iframe src="/page">"#);
        assert!(srcs.is_empty());
    }

    #[test]
    fn attribute_order_does_not_matter() {
        let srcs = image_sources(r#"<img alt="pic" width="40" src="/deep.png" height="40">"#);
        assert!(srcs.contains("/deep.png"));
    }

    #[test]
    fn img_without_src_is_skipped() {
        let srcs = image_sources(r#"<img alt="no source"><img src="/real">"#);
        assert_eq!(srcs.len(), 1);
        assert!(srcs.contains("/real"));
    }

    #[test]
    fn empty_and_plain_text_bodies_reference_nothing() {
        assert!(image_sources("").is_empty());
        assert!(image_sources("just words, no markup").is_empty());
    }

    #[test]
    fn escaped_ampersand_in_url_is_decoded() {
        let srcs = image_sources(r#"<img src="/a?x=1&amp;y=2">"#);
        assert!(srcs.contains("/a?x=1&y=2"));
    }

    #[test]
    fn urls_before_malformed_tail_survive() {
        let srcs = image_sources(r#"<img src="/kept.png"><p <<< busted"#);
        assert!(srcs.contains("/kept.png"));
    }

    #[test]
    fn nested_markup_is_walked() {
        let srcs = image_sources(
            r#"<div><p>intro</p><figure><img src="/fig1.jpg"><figcaption>one</figcaption></figure></div>"#,
        );
        assert!(srcs.contains("/fig1.jpg"));
    }
}
