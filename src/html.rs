//! Read-only HTML inspection.
//!
//! Pages are parsed with `scraper` (html5ever) only to pull out facts about
//! them: link attribute values, the `<title>`, a meta-refresh target. The
//! parse tree is never serialized back; rewriting works on the raw bytes, see
//! [`crate::rewrite`].

use scraper::{ElementRef, Html};
use std::collections::BTreeSet;

/// Attributes whose values are treated as links.
const LINK_ATTRIBUTES: &[&str] = &["href", "src", "poster", "data", "action", "background"];

pub struct HtmlDocument {
    document: Html,
}

impl HtmlDocument {
    /// Parse a page. Invalid UTF-8 is replaced for parsing purposes only.
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        Self {
            document: Html::parse_document(&text),
        }
    }

    fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
    }

    /// Distinct values of every link-like attribute, sorted.
    pub fn links(&self) -> BTreeSet<String> {
        let mut links = BTreeSet::new();
        for element in self.elements() {
            for attribute in LINK_ATTRIBUTES {
                if let Some(value) = element.value().attr(attribute) {
                    links.insert(value.to_string());
                }
            }
        }
        links
    }

    /// Trimmed text of the first `<title>`, if non-empty.
    pub fn title(&self) -> Option<String> {
        self.elements()
            .find(|e| e.value().name() == "title")
            .map(|e| e.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Target of `<meta http-equiv="refresh" content="0; url=...">`.
    pub fn refresh_target(&self) -> Option<String> {
        self.elements()
            .filter(|e| e.value().name() == "meta")
            .filter(|e| {
                e.value()
                    .attr("http-equiv")
                    .is_some_and(|v| v.eq_ignore_ascii_case("refresh"))
            })
            .find_map(|e| e.value().attr("content").and_then(parse_refresh_content))
    }
}

/// Extract the URL from a refresh `content` value such as `5;URL='x.html'`.
fn parse_refresh_content(content: &str) -> Option<String> {
    content.split(';').skip(1).find_map(|part| {
        let part = part.trim();
        let (key, value) = part.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("url") {
            return None;
        }
        let url = value.trim().trim_matches(|c| c == '\'' || c == '"').trim();
        (!url.is_empty()).then(|| url.to_string())
    })
}
