//! Shared test utilities for the siteark test suite.
//!
//! Provides a builder for scratch source trees plus lookup helpers over
//! drained entry streams.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = SiteBuilder::new()
//!     .file("index.html", "<title>Home</title>")
//!     .file("favicon.png", "png")
//!     .build();
//!
//! let mut source = site.source();
//! let entries = drain(&mut source);
//! let home = find_entry(&entries, "/A/index.html");
//! assert_eq!(home.title, "Home");
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::BuildConfig;
use crate::entry::{Entry, EntryKind};
use crate::source::EntrySource;

// =========================================================================
// Fixture setup
// =========================================================================

/// A scratch site: the source tree lives in `<tmp>/site`, the redirects file
/// (if any) next to it so the walker never sees it.
pub struct Site {
    pub tmp: TempDir,
    pub config: BuildConfig,
}

impl Site {
    pub fn root(&self) -> PathBuf {
        self.tmp.path().join("site")
    }

    /// Start an entry source over this site.
    pub fn source(&self) -> EntrySource {
        EntrySource::start(self.root(), self.config.clone()).unwrap()
    }
}

pub struct SiteBuilder {
    files: Vec<(String, Vec<u8>)>,
    redirects: Option<String>,
    config: BuildConfig,
}

impl SiteBuilder {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            redirects: None,
            config: BuildConfig {
                welcome: "index.html".into(),
                favicon: "favicon.png".into(),
                language: "eng".into(),
                title: "Test Site".into(),
                description: "A site for tests".into(),
                creator: "Tester".into(),
                publisher: "Tester".into(),
                ..BuildConfig::default()
            },
        }
    }

    pub fn file(self, path: &str, content: &str) -> Self {
        self.file_bytes(path, content.as_bytes())
    }

    pub fn file_bytes(mut self, path: &str, content: &[u8]) -> Self {
        self.files.push((path.to_string(), content.to_vec()));
        self
    }

    pub fn redirects(mut self, content: &str) -> Self {
        self.redirects = Some(content.to_string());
        self
    }

    pub fn layout(mut self, path: &str) -> Self {
        self.config.layout = Some(path.to_string());
        self
    }

    pub fn welcome(mut self, path: &str) -> Self {
        self.config.welcome = path.to_string();
        self
    }

    pub fn inflate_html(mut self) -> Self {
        self.config.inflate_html = true;
        self
    }

    pub fn build(self) -> Site {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("site");
        fs::create_dir_all(&root).unwrap();

        for (path, content) in &self.files {
            write_file(&root.join(path), content);
        }

        let mut config = self.config;
        if let Some(redirects) = &self.redirects {
            let path = tmp.path().join("redirects.tsv");
            fs::write(&path, redirects).unwrap();
            config.redirects = Some(path.display().to_string());
        }

        Site { tmp, config }
    }
}

fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

// =========================================================================
// Entry stream helpers
// =========================================================================

/// Pull every entry until end of stream.
pub fn drain(source: &mut EntrySource) -> Vec<Entry> {
    let mut entries = Vec::new();
    while let Some(entry) = source.get_next_entry().unwrap() {
        entries.push(entry);
    }
    entries
}

/// Find an entry by `/<namespace>/<url>`. Panics if not found.
pub fn find_entry<'a>(entries: &'a [Entry], aid: &str) -> &'a Entry {
    entries.iter().find(|e| e.aid() == aid).unwrap_or_else(|| {
        let aids: Vec<String> = entries.iter().map(Entry::aid).collect();
        panic!("entry '{aid}' not found. Available: {aids:?}")
    })
}

/// URLs of the file entries, in stream order.
pub fn file_urls(entries: &[Entry]) -> Vec<&str> {
    entries
        .iter()
        .filter(|e| matches!(e.kind, EntryKind::File { .. }))
        .map(|e| e.url.url.as_str())
        .collect()
}
