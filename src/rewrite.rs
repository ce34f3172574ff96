//! Link rewriting inside HTML and CSS payloads.
//!
//! Source pages link to each other with filesystem-relative URLs. Inside the
//! archive those targets move under namespaces (`b.html` → `A/b.html`,
//! `img/x.png` → `I/img/x.png`), so every link is recomputed with
//! [`NamespaceResolver::compute_new_url`] and substituted into the payload.
//!
//! Both rewriters are textual: they replace exact byte sequences and never
//! re-serialize a parse tree, so bytes that are not part of a link come out
//! exactly as they went in.
//!
//! ## HTML
//!
//! The page is parsed once to collect the distinct link attribute values.
//! Each value is then replaced wherever it appears as a quoted literal
//! (`"value"` or `'value'`). Fragment-only (`#top`), query-only (`?x`) and
//! `data:` links are skipped. All matches are located in the original bytes
//! before anything is substituted, so a rewritten link is never rewritten a
//! second time by a later, textually overlapping value.
//!
//! ## CSS
//!
//! Each `url(...)` token is processed in order. Optional quotes are stripped,
//! and a `?query` suffix is cut off before the path is classified.
//! Embeddable fonts are inlined as base64 `data:` URIs because readers
//! enforce same-origin rules on font loads; everything else is remapped. Only
//! the first occurrence of `delimiter + url + delimiter` is replaced per token.

use crate::mime;
use crate::namespace::{NamespaceResolver, compute_absolute_path};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::io;
use std::path::Path;
use tracing::{debug, warn};

pub struct LinkRewriter<'a> {
    resolver: &'a NamespaceResolver,
    root: &'a Path,
}

impl<'a> LinkRewriter<'a> {
    /// `root` is the content directory that link targets are read from when
    /// fonts get inlined.
    pub fn new(resolver: &'a NamespaceResolver, root: &'a Path) -> Self {
        Self { resolver, root }
    }

    /// Rewrite the links of the HTML page at `current` (root-relative path).
    pub fn rewrite_html(&self, bytes: &[u8], current: &str) -> Vec<u8> {
        let links = crate::html::HtmlDocument::parse(bytes).links();

        let mut replacements = Vec::new();
        for link in links {
            if link.is_empty()
                || link.starts_with('#')
                || link.starts_with('?')
                || link.starts_with("data:")
            {
                continue;
            }
            let new_url = self.resolver.compute_new_url(current, &link);
            if new_url == link {
                continue;
            }
            // The parser hands back decoded values; the page may spell `&`
            // as `&amp;`.
            let mut forms = vec![(link.clone(), new_url.clone())];
            if link.contains('&') {
                forms.push((escape_ampersands(&link), escape_ampersands(&new_url)));
            }
            for (old, new) in &forms {
                for quote in ['"', '\''] {
                    replacements.push((
                        format!("{quote}{old}{quote}").into_bytes(),
                        format!("{quote}{new}{quote}").into_bytes(),
                    ));
                }
            }
        }

        replace_all(bytes, &replacements)
    }

    /// Rewrite the `url(...)` tokens of the stylesheet at `current`.
    pub fn rewrite_css(&self, bytes: &[u8], current: &str) -> Vec<u8> {
        let mut css = bytes.to_vec();
        let mut cursor = 0;

        while let Some(start) = find_from(&css, b"url(", cursor) {
            let Some(close) = find_from(&css, b")", start) else {
                break;
            };
            cursor = close;

            let open_quoted = css.get(start + 4).is_some_and(|&b| is_quote(b));
            let inner_start = start + 4 + usize::from(open_quoted);
            let close_quoted = close > inner_start && is_quote(css[close - 1]);
            let inner_end = close - usize::from(close_quoted);
            if inner_end <= inner_start {
                continue;
            }

            let url = String::from_utf8_lossy(&css[inner_start..inner_end]).into_owned();
            if url.starts_with("data:") {
                continue;
            }
            let start_delimiter = css[inner_start - 1] as char;
            let end_delimiter = css[inner_end] as char;

            let (path, has_query) = match url.find('?') {
                Some(mark) => (&url[..mark], true),
                None => (url.as_str(), false),
            };
            let mime_type = mime::mime_type_for(path);

            let (needle, replacement) = if mime::is_embeddable_font(mime_type) {
                match self.read_target(current, path) {
                    Ok(font) => (
                        format!("{start_delimiter}{url}{end_delimiter}"),
                        format!(
                            "{start_delimiter}data:{mime_type};base64,{}{end_delimiter}",
                            STANDARD.encode(font)
                        ),
                    ),
                    Err(err) => {
                        warn!(font = path, stylesheet = current, error = %err, "unable to inline font");
                        continue;
                    }
                }
            } else {
                let new_url = self.resolver.compute_new_url(current, path);
                if new_url == path {
                    continue;
                }
                if has_query {
                    // The query stays in place; '?' closes the match.
                    (
                        format!("{start_delimiter}{path}?"),
                        format!("{start_delimiter}{new_url}?"),
                    )
                } else {
                    (
                        format!("{start_delimiter}{url}{end_delimiter}"),
                        format!("{start_delimiter}{new_url}{end_delimiter}"),
                    )
                }
            };

            if let Some(pos) = replace_once(&mut css, needle.as_bytes(), replacement.as_bytes())
                && pos < cursor
            {
                cursor = if pos + needle.len() > cursor {
                    pos + replacement.len()
                } else {
                    cursor - needle.len() + replacement.len()
                };
            }
        }

        css
    }

    fn read_target(&self, current: &str, link: &str) -> io::Result<Vec<u8>> {
        let resolved = compute_absolute_path(current, &mime::percent_decode(link));
        let path = self.root.join(&resolved.path);
        debug!(path = %path.display(), "inlining font");
        std::fs::read(path)
    }
}

fn is_quote(b: u8) -> bool {
    b == b'"' || b == b'\''
}

fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Replace the first occurrence of `needle`, returning where it was.
fn replace_once(haystack: &mut Vec<u8>, needle: &[u8], replacement: &[u8]) -> Option<usize> {
    let pos = find_from(haystack, needle, 0)?;
    haystack.splice(pos..pos + needle.len(), replacement.iter().copied());
    Some(pos)
}

fn escape_ampersands(value: &str) -> String {
    value.replace('&', "&amp;")
}

/// Replace every occurrence of each needle, matching against the original
/// input only. Overlapping matches resolve to the earliest one.
fn replace_all(input: &[u8], replacements: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
    let mut matches: Vec<(usize, usize)> = Vec::new();
    for (index, (needle, _)) in replacements.iter().enumerate() {
        let mut from = 0;
        while let Some(pos) = find_from(input, needle, from) {
            matches.push((pos, index));
            from = pos + needle.len();
        }
    }
    matches.sort_unstable();

    let mut output = Vec::with_capacity(input.len());
    let mut copied = 0;
    for (pos, index) in matches {
        if pos < copied {
            continue;
        }
        let (needle, replacement) = &replacements[index];
        output.extend_from_slice(&input[copied..pos]);
        output.extend_from_slice(replacement);
        copied = pos + needle.len();
    }
    output.extend_from_slice(&input[copied..]);
    output
}
