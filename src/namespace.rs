//! Namespace and URL assignment for archive entries.
//!
//! Every entry lives at `/<namespace>/<url>`, where the namespace is a single
//! character partitioning entry kinds:
//!
//! | Namespace | Content |
//! |-----------|---------|
//! | `A` | Articles: HTML pages and HTML templates |
//! | `I` | Images, media and other binary content |
//! | `-` | Layout page, stylesheets, scripts, JSON, fonts |
//! | `M` | Metadata keys |
//!
//! With `unique_namespace` enabled, everything except metadata and the layout
//! page collapses onto `A`.
//!
//! ## Determinism
//!
//! [`NamespaceResolver::compute_url`] depends only on the path and the
//! resolver's flags. The link rewriter relies on this: when `a.html` links to
//! `b.html`, it recomputes `b.html`'s archive URL on its own instead of
//! looking the entry up, so both computations must agree regardless of the
//! order in which entries are streamed or rewritten.
//!
//! ## Relative links
//!
//! Rewritten links are relative (`../I/img/logo.png`) rather than absolute so
//! an archive keeps working under whatever prefix a reader mounts it.

use crate::mime;
use std::fmt;

pub const ARTICLE: char = 'A';
pub const IMAGE: char = 'I';
pub const AUXILIARY: char = '-';
pub const METADATA: char = 'M';

/// Location of an entry inside the archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveUrl {
    pub namespace: char,
    pub url: String,
}

impl ArchiveUrl {
    pub fn new(namespace: char, url: impl Into<String>) -> Self {
        Self {
            namespace,
            url: url.into(),
        }
    }

    /// Rooted form, `/<namespace>/<url>`.
    pub fn full(&self) -> String {
        format!("/{}/{}", self.namespace, self.url)
    }
}

impl fmt::Display for ArchiveUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.url)
    }
}

/// Maps source paths (relative to the content root, `/`-separated) to
/// archive URLs.
#[derive(Debug, Clone, Default)]
pub struct NamespaceResolver {
    unique_namespace: bool,
    layout: Option<String>,
}

impl NamespaceResolver {
    pub fn new(unique_namespace: bool, layout: Option<String>) -> Self {
        Self {
            unique_namespace,
            layout,
        }
    }

    pub fn unique_namespace(&self) -> bool {
        self.unique_namespace
    }

    pub fn is_layout(&self, path: &str) -> bool {
        self.layout.as_deref() == Some(path)
    }

    /// Namespace for a content MIME type.
    pub fn namespace_for_mime(&self, mime_type: &str) -> char {
        if self.unique_namespace {
            return ARTICLE;
        }
        if mime::is_html(mime_type) || mime::is_html_template(mime_type) || mime_type.is_empty() {
            ARTICLE
        } else if mime_type.starts_with("text")
            || mime::is_embeddable_font(mime_type)
            || mime_type == "application/javascript"
            || mime_type == "application/json"
        {
            AUXILIARY
        } else {
            IMAGE
        }
    }

    /// Archive URL of a source path.
    pub fn compute_url(&self, path: &str) -> ArchiveUrl {
        if self.is_layout(path) {
            return ArchiveUrl::new(AUXILIARY, path);
        }
        let namespace = self.namespace_for_mime(mime::mime_type_for(path));
        ArchiveUrl::new(namespace, path)
    }

    /// Rewrite `link`, found in the document at `current`, into a link that
    /// resolves inside the archive.
    ///
    /// Links with a scheme (`https:`, `mailto:`, `//host/...`) are returned
    /// unchanged, as are links already in archive form. A trailing `?query`
    /// or `#fragment` is carried over onto the new URL.
    pub fn compute_new_url(&self, current: &str, link: &str) -> String {
        if has_scheme(link) {
            return link.to_string();
        }
        let (path, suffix) = split_suffix(link);
        if path.is_empty() {
            return link.to_string();
        }

        let base = self.compute_url(current).full();
        let resolved = compute_absolute_path(current, path);
        if resolved.escaped > 0 && self.is_archive_form(&base, path) {
            return link.to_string();
        }

        let target = self.compute_url(&resolved.path).full();
        let mut new_url = compute_relative_path(&base, &target);
        new_url.push_str(suffix);
        new_url
    }

    /// Whether `link`, read relative to the rooted archive URL `base`, lands
    /// on `/<ns>/<path>` with `ns` being the namespace `path` would get.
    fn is_archive_form(&self, base: &str, link: &str) -> bool {
        let resolved = compute_absolute_path(base.trim_start_matches('/'), link);
        if resolved.escaped > 0 {
            return false;
        }
        let Some((ns, rest)) = resolved.path.split_once('/') else {
            return false;
        };
        let mut chars = ns.chars();
        match (chars.next(), chars.next()) {
            (Some(namespace), None) if !rest.is_empty() => {
                self.compute_url(rest).namespace == namespace
            }
            _ => false,
        }
    }
}

/// A link resolved against the directory of the document containing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Root-relative path, `/`-separated, no leading slash.
    pub path: String,
    /// How many `..` segments tried to climb above the root.
    pub escaped: usize,
}

/// Resolve `link` relative to the directory containing `current`.
///
/// - `"dir/a.html"`, `"b.html"` → `"dir/b.html"`
/// - `"dir/a.html"`, `"../css/x.css"` → `"css/x.css"`
/// - `"dir/a.html"`, `"/img/x.png"` → `"img/x.png"` (root-relative)
pub fn compute_absolute_path(current: &str, link: &str) -> ResolvedPath {
    let mut segments: Vec<&str> = current.split('/').filter(|s| !s.is_empty()).collect();
    segments.pop();
    if link.starts_with('/') {
        segments.clear();
    }

    let mut escaped = 0;
    for segment in link.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    escaped += 1;
                }
            }
            s => segments.push(s),
        }
    }

    ResolvedPath {
        path: segments.join("/"),
        escaped,
    }
}

/// Relative link from the page at rooted URL `base` to rooted URL `target`.
///
/// - `"/A/a.html"` → `"/A/b.html"` gives `"b.html"`
/// - `"/A/dir/a.html"` → `"/I/img/x.png"` gives `"../../I/img/x.png"`
pub fn compute_relative_path(base: &str, target: &str) -> String {
    let base_segments: Vec<&str> = base.trim_start_matches('/').split('/').collect();
    let target_segments: Vec<&str> = target.trim_start_matches('/').split('/').collect();
    let base_dirs = &base_segments[..base_segments.len().saturating_sub(1)];

    let common = base_dirs
        .iter()
        .zip(&target_segments[..target_segments.len().saturating_sub(1)])
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = "../".repeat(base_dirs.len() - common);
    relative.push_str(&target_segments[common..].join("/"));
    relative
}

/// `true` for `scheme:...` and protocol-relative `//host/...` links.
pub fn has_scheme(link: &str) -> bool {
    if link.starts_with("//") {
        return true;
    }
    let Some(colon) = link.find(':') else {
        return false;
    };
    let scheme = &link[..colon];
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Split `path?query#fragment` into the path and the rest.
fn split_suffix(link: &str) -> (&str, &str) {
    match link.find(['?', '#']) {
        Some(pos) => link.split_at(pos),
        None => (link, ""),
    }
}
