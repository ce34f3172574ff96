//! The pull side of the pipeline.
//!
//! [`EntrySource`] owns everything a build shares: the configuration, the
//! metadata and redirect queues, the consumer half of the file queue fed by
//! the background [`DirectoryWalker`], the per-MIME counters and the
//! template page index. A storage engine drives it through three calls:
//!
//! ```text
//! main_page()          → archive URL of the welcome page
//! get_next_entry()     → Some(entry) ... None, None, ...
//! get_payload(&entry)  → bytes
//! ```
//!
//! Entries come out strictly as metadata, then redirects, then files in walk
//! order. File candidates that cannot be read, are empty, are not regular
//! files, or are meta-refresh pages pointing at themselves are skipped.
//! Other meta-refresh pages become redirects.
//!
//! Payloads are produced on request. HTML goes through the template renderer
//! (when a layout is configured or the page is itself a template) and then
//! the link rewriter; CSS only through the link rewriter; everything else is
//! passed through.

use crate::config::BuildConfig;
use crate::entry::{Entry, EntryKind};
use crate::html::HtmlDocument;
use crate::metadata::{self, MetadataKey, MimeCounters};
use crate::mime;
use crate::namespace::{ArchiveUrl, NamespaceResolver, compute_absolute_path, has_scheme};
use crate::queue::{QUEUE_CAPACITY, QueueConsumer, bounded_queue};
use crate::rewrite::LinkRewriter;
use crate::template::{self, Page, PageStore, TemplateError};
use crate::walk::{DirectoryWalker, WalkError, WalkHandle, WalkStats};
use flate2::read::{GzDecoder, ZlibDecoder};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("unable to read redirects file {path}: {source}")]
    Redirects {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub struct EntrySource {
    config: BuildConfig,
    root: PathBuf,
    resolver: NamespaceResolver,
    metadata: VecDeque<MetadataKey>,
    redirects: VecDeque<Entry>,
    files: QueueConsumer<PathBuf>,
    walker: Option<WalkHandle>,
    walk_stats: Option<WalkStats>,
    counters: MimeCounters,
    pages: HashMap<(char, String), Page>,
    layout: Option<Page>,
}

impl EntrySource {
    /// Load redirects and start walking `root` in the background.
    pub fn start(root: impl Into<PathBuf>, config: BuildConfig) -> Result<Self, SourceError> {
        let root = root.into();
        let resolver = NamespaceResolver::new(config.unique_namespace, config.layout.clone());

        let redirects = match &config.redirects {
            Some(path) => load_redirects(Path::new(path))?,
            None => VecDeque::new(),
        };

        let layout = config.layout.as_ref().map(|path| Page {
            namespace: resolver.compute_url(path).namespace,
            url: path.clone(),
            title: path.clone(),
            mime_type: mime::mime_type_for(path).to_string(),
        });

        let (producer, files) = bounded_queue(QUEUE_CAPACITY);
        let walker = DirectoryWalker::new(root.clone()).spawn(producer);

        Ok(Self {
            config,
            root,
            resolver,
            metadata: MetadataKey::ALL.into_iter().collect(),
            redirects,
            files,
            walker: Some(walker),
            walk_stats: None,
            counters: MimeCounters::default(),
            pages: HashMap::new(),
            layout,
        })
    }

    /// Archive URL of the welcome page.
    pub fn main_page(&self) -> ArchiveUrl {
        self.resolver.compute_url(&self.config.welcome)
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn counters(&self) -> &MimeCounters {
        &self.counters
    }

    /// Walk counters, available once the stream has ended.
    pub fn walk_stats(&self) -> Option<WalkStats> {
        self.walk_stats
    }

    /// Next entry, or `None` once everything has been streamed. Keeps
    /// returning `None` after that.
    ///
    /// Fails if the walker could not open the source directory.
    pub fn get_next_entry(&mut self) -> Result<Option<Entry>, SourceError> {
        if let Some(key) = self.metadata.pop_front() {
            let favicon_mime = mime::mime_type_for(&self.config.favicon);
            return Ok(Some(Entry::metadata(key, favicon_mime)));
        }
        if let Some(redirect) = self.redirects.pop_front() {
            return Ok(Some(redirect));
        }

        while let Some(path) = self.files.recv() {
            let Some(entry) = self.candidate(&path) else {
                continue;
            };
            debug!(aid = %entry.aid(), "creating entry");
            if let EntryKind::File { .. } = entry.kind {
                self.counters.increment(&entry.mime_type);
                self.remember(&entry);
            }
            return Ok(Some(entry));
        }

        if let Some(walker) = self.walker.take() {
            let stats = walker.join()?;
            info!(
                files = stats.files,
                skipped = stats.skipped,
                "finished reading source directory"
            );
            self.walk_stats = Some(stats);
        }
        Ok(None)
    }

    /// Bytes to store for `entry`.
    pub fn get_payload(&self, entry: &Entry) -> Result<Vec<u8>, SourceError> {
        debug!(aid = %entry.aid(), "packing data");
        match &entry.kind {
            EntryKind::Metadata(key) => Ok(metadata::payload(
                *key,
                &self.config,
                &self.root,
                &self.counters,
            )?),
            EntryKind::Redirect { .. } => Ok(Vec::new()),
            EntryKind::File { path } => {
                let current = entry.url.url.as_str();
                if self.resolver.is_layout(current) {
                    return Ok(fs::read(path)?);
                }

                let mime_type = entry.mime_type.as_str();
                let rewriter = LinkRewriter::new(&self.resolver, &self.root);
                if mime::is_html(mime_type) || mime::is_html_template(mime_type) {
                    let rendered =
                        template::render(self, &entry.page(), true, self.config.max_recurse)?;
                    Ok(rewriter.rewrite_html(&rendered, current))
                } else if mime::is_css(mime_type) {
                    Ok(rewriter.rewrite_css(&fs::read(path)?, current))
                } else {
                    Ok(fs::read(path)?)
                }
            }
        }
    }

    /// Build the entry for a walked path, or `None` if it should be skipped.
    fn candidate(&self, path: &Path) -> Option<Entry> {
        let relative = match path.strip_prefix(&self.root) {
            Ok(relative) => relative_url(relative),
            Err(_) => return None,
        };

        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unable to stat file, skipping");
                return None;
            }
        };
        if !meta.is_file() {
            debug!(path = %path.display(), "not a regular file, skipping");
            return None;
        }
        if meta.len() == 0 {
            debug!(path = %path.display(), "empty file, skipping");
            return None;
        }

        let url = self.resolver.compute_url(&relative);
        let mime_type = mime::mime_type_for(&relative);
        let file = EntryKind::File {
            path: path.to_path_buf(),
        };

        if !mime::is_html(mime_type) {
            if let Err(err) = fs::File::open(path) {
                warn!(path = %path.display(), error = %err, "unable to read file, skipping");
                return None;
            }
            return Some(Entry {
                kind: file,
                title: relative,
                url,
                mime_type: mime_type.to_string(),
            });
        }

        let bytes = match self.read_source(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unable to read file, skipping");
                return None;
            }
        };
        let document = HtmlDocument::parse(&bytes);
        let title = document.title().unwrap_or_else(|| relative.clone());

        if let Some(refresh) = document.refresh_target().filter(|t| !has_scheme(t)) {
            let target_path = refresh.split(['?', '#']).next().unwrap_or_default();
            let resolved = compute_absolute_path(&relative, target_path);
            let target = self.resolver.compute_url(&resolved.path);
            if target == url {
                warn!(path = %path.display(), "page redirects to itself, skipping");
                return None;
            }
            return Some(Entry {
                kind: EntryKind::Redirect { target, line: None },
                url,
                title,
                mime_type: String::new(),
            });
        }

        Some(Entry {
            kind: file,
            url,
            title,
            mime_type: mime_type.to_string(),
        })
    }

    /// Index a file entry for template links, by title and by URL.
    fn remember(&mut self, entry: &Entry) {
        let page = entry.page();
        self.pages
            .entry((page.namespace, page.title.clone()))
            .or_insert_with(|| page.clone());
        self.pages
            .entry((page.namespace, page.url.clone()))
            .or_insert(page);
    }

    /// Raw file bytes, inflated first when configured and the file is HTML.
    fn read_source(&self, path: &Path) -> io::Result<Vec<u8>> {
        let bytes = fs::read(path)?;
        let is_html = path
            .to_str()
            .is_some_and(|p| mime::is_html(mime::mime_type_for(p)));
        if self.config.inflate_html && is_html {
            Ok(inflate(bytes))
        } else {
            Ok(bytes)
        }
    }
}

impl PageStore for EntrySource {
    fn layout_page(&self) -> Option<Page> {
        self.layout.clone()
    }

    fn find(&self, namespace: char, title: &str) -> Option<Page> {
        self.pages.get(&(namespace, title.to_string())).cloned()
    }

    fn data(&self, page: &Page) -> io::Result<Vec<u8>> {
        self.read_source(&self.root.join(&page.url))
    }
}

/// `/`-separated form of a root-relative path.
fn relative_url(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Read a redirects file into redirect entries, one per usable line.
pub fn load_redirects(path: &Path) -> Result<VecDeque<Entry>, SourceError> {
    let content = fs::read_to_string(path).map_err(|source| SourceError::Redirects {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "reading redirects file");

    let mut redirects = VecDeque::new();
    for (number, line) in content.lines().enumerate() {
        match Entry::from_redirect_line(line) {
            Some(entry) => redirects.push_back(entry),
            None => warn!(line = number + 1, "redirect line needs url, title and target, skipping"),
        }
    }
    Ok(redirects)
}

/// Inflate gzip or zlib data. Anything else, or data that fails to inflate,
/// is returned unchanged.
pub fn inflate(bytes: Vec<u8>) -> Vec<u8> {
    let gzip = bytes.starts_with(&[0x1f, 0x8b]);
    let zlib = matches!(
        bytes.as_slice(),
        [cmf, flg, ..] if cmf & 0x0f == 8 && ((u16::from(*cmf) << 8) | u16::from(*flg)) % 31 == 0
    );

    let mut out = Vec::new();
    let result = if gzip {
        GzDecoder::new(bytes.as_slice()).read_to_end(&mut out)
    } else if zlib {
        ZlibDecoder::new(bytes.as_slice()).read_to_end(&mut out)
    } else {
        return bytes;
    };
    match result {
        Ok(_) => out,
        Err(err) => {
            warn!(error = %err, "unable to inflate HTML, keeping it as is");
            bytes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use flate2::Compression;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use std::io::Write;

    // =========================================================================
    // Entry stream
    // =========================================================================

    #[test]
    fn metadata_then_redirects_then_files() {
        let site = SiteBuilder::new()
            .file("index.html", "<title>Home</title><a href=\"b.html\">b</a>")
            .file("b.html", "<p>b</p>")
            .file("favicon.png", "png")
            .redirects("old\tOld Page\tindex.html\n")
            .build();

        let entries = drain(&mut site.source());
        let aids: Vec<String> = entries.iter().map(Entry::aid).collect();
        assert_eq!(
            aids,
            vec![
                "/M/Language",
                "/M/Publisher",
                "/M/Creator",
                "/M/Title",
                "/M/Description",
                "/M/Date",
                "/M/Favicon",
                "/M/Counter",
                "/A/old",
                "/A/b.html",
                "/I/favicon.png",
                "/A/index.html",
            ]
        );
    }

    #[test]
    fn end_of_stream_repeats() {
        let site = SiteBuilder::new().file("index.html", "x").file("favicon.png", "p").build();
        let mut source = site.source();
        drain(&mut source);
        for _ in 0..3 {
            assert!(source.get_next_entry().unwrap().is_none());
        }
        assert_eq!(source.walk_stats().unwrap().files, 2);
    }

    #[test]
    fn invalid_files_are_skipped() {
        let site = SiteBuilder::new()
            .file("index.html", "x")
            .file("favicon.png", "p")
            .file("empty.txt", "")
            .build();
        #[cfg(unix)]
        std::os::unix::fs::symlink(site.root().join("gone.html"), site.root().join("dangling.html"))
            .unwrap();

        let entries = drain(&mut site.source());
        let files = file_urls(&entries);
        assert_eq!(files, vec!["favicon.png", "index.html"]);
    }

    #[test]
    fn counter_counts_files_only() {
        let site = SiteBuilder::new()
            .file("index.html", "x")
            .file("a.html", "y")
            .file("favicon.png", "p")
            .file("s.css", "a{}")
            .redirects("r\tR\tindex.html\n")
            .build();
        let mut source = site.source();
        let entries = drain(&mut source);

        let counter = find_entry(&entries, "/M/Counter");
        let payload = source.get_payload(counter).unwrap();
        assert_eq!(
            String::from_utf8(payload).unwrap(),
            "text/html=2;image/png=1;text/css=1;"
        );
    }

    #[test]
    fn html_title_used() {
        let site = SiteBuilder::new()
            .file("index.html", "<html><head><title> Welcome </title></head></html>")
            .file("favicon.png", "p")
            .build();
        let entries = drain(&mut site.source());
        assert_eq!(find_entry(&entries, "/A/index.html").title, "Welcome");
        assert_eq!(find_entry(&entries, "/I/favicon.png").title, "favicon.png");
    }

    #[test]
    fn meta_refresh_becomes_redirect() {
        let site = SiteBuilder::new()
            .file("index.html", "x")
            .file("favicon.png", "p")
            .file(
                "docs/old.html",
                r#"<meta http-equiv="refresh" content="0; url=../index.html#top">"#,
            )
            .file("self.html", r#"<meta http-equiv="refresh" content="0; url=self.html">"#)
            .build();
        let mut source = site.source();
        let entries = drain(&mut source);

        let old = find_entry(&entries, "/A/docs/old.html");
        assert_eq!(old.redirect_target(), Some(&ArchiveUrl::new('A', "index.html")));
        assert!(entries.iter().all(|e| e.aid() != "/A/self.html"));

        let counter = source
            .get_payload(find_entry(&entries, "/M/Counter"))
            .unwrap();
        assert_eq!(String::from_utf8(counter).unwrap(), "image/png=1;text/html=1;");
    }

    #[test]
    fn missing_root_fails_at_end_of_stream() {
        let site = SiteBuilder::new().build();
        let mut source =
            EntrySource::start(site.root().join("missing"), site.config.clone()).unwrap();
        for _ in 0..MetadataKey::ALL.len() {
            assert!(source.get_next_entry().unwrap().is_some());
        }
        assert!(matches!(
            source.get_next_entry(),
            Err(SourceError::Walk(WalkError::RootUnreadable { .. }))
        ));
    }

    // =========================================================================
    // Payloads
    // =========================================================================

    #[test]
    fn html_links_rewritten() {
        let site = SiteBuilder::new()
            .file("index.html", r#"<img src="img/x.png"><a href="b.html">b</a>"#)
            .file("b.html", "b")
            .file("img/x.png", "png")
            .file("favicon.png", "p")
            .build();
        let mut source = site.source();
        let entries = drain(&mut source);

        let payload = source
            .get_payload(find_entry(&entries, "/A/index.html"))
            .unwrap();
        assert_eq!(
            String::from_utf8(payload).unwrap(),
            r#"<img src="../I/img/x.png"><a href="b.html">b</a>"#
        );
    }

    #[test]
    fn binary_payload_untouched() {
        let site = SiteBuilder::new()
            .file("index.html", "x")
            .file("favicon.png", "p")
            .file_bytes("img/raw.bin", &[0, 159, 146, 150, b'"'])
            .build();
        let mut source = site.source();
        let entries = drain(&mut source);
        let payload = source
            .get_payload(find_entry(&entries, "/I/img/raw.bin"))
            .unwrap();
        assert_eq!(payload, vec![0, 159, 146, 150, b'"']);
    }

    #[test]
    fn payload_of_deleted_file_fails() {
        let site = SiteBuilder::new()
            .file("index.html", "<p>hi</p>")
            .file("favicon.png", "p")
            .file("img/x.png", "x")
            .build();
        let mut source = site.source();
        let entries = drain(&mut source);

        fs::remove_file(site.root().join("img/x.png")).unwrap();
        fs::remove_file(site.root().join("index.html")).unwrap();

        assert!(matches!(
            source.get_payload(find_entry(&entries, "/I/img/x.png")),
            Err(SourceError::Io(_))
        ));
        assert!(matches!(
            source.get_payload(find_entry(&entries, "/A/index.html")),
            Err(SourceError::Template(TemplateError::Io(_)))
        ));
    }

    #[test]
    fn layout_wraps_pages() {
        let site = SiteBuilder::new()
            .file("_layout.html", r#"<link href="s.css"><h1><%title%></h1><%content%>"#)
            .file("index.html", "<title>Home</title><p>hi</p>")
            .file("favicon.png", "p")
            .file("s.css", "a{}")
            .layout("_layout.html")
            .build();
        let mut source = site.source();
        let entries = drain(&mut source);

        let layout = find_entry(&entries, "/-/_layout.html");
        assert_eq!(
            source.get_payload(layout).unwrap(),
            br#"<link href="s.css"><h1><%title%></h1><%content%>"#
        );

        let page = source
            .get_payload(find_entry(&entries, "/A/index.html"))
            .unwrap();
        assert_eq!(
            String::from_utf8(page).unwrap(),
            r#"<link href="../-/s.css"><h1>Home</h1><title>Home</title><p>hi</p>"#
        );
    }

    #[test]
    fn template_links_resolve_through_index() {
        let site = SiteBuilder::new()
            .file("index.tmpl", "<main><%/A/Sidebar%></main>")
            .file("side.html", "<title>Sidebar</title>[side]")
            .file("favicon.png", "p")
            .welcome("index.tmpl")
            .build();
        let mut source = site.source();
        let entries = drain(&mut source);

        let page = source
            .get_payload(find_entry(&entries, "/A/index.tmpl"))
            .unwrap();
        assert_eq!(
            String::from_utf8(page).unwrap(),
            "<main><title>Sidebar</title>[side]</main>"
        );
    }

    #[test]
    fn inflate_html_when_enabled() {
        let html = b"<title>Zipped</title><img src=\"x.png\">";
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(html).unwrap();

        let site = SiteBuilder::new()
            .file_bytes("index.html", &gz.finish().unwrap())
            .file("favicon.png", "p")
            .inflate_html()
            .build();
        let mut source = site.source();
        let entries = drain(&mut source);

        let entry = find_entry(&entries, "/A/index.html");
        assert_eq!(entry.title, "Zipped");
        assert_eq!(
            source.get_payload(entry).unwrap(),
            b"<title>Zipped</title><img src=\"../I/x.png\">"
        );
    }

    #[test]
    fn inflate_detects_formats() {
        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(b"hello").unwrap();
        assert_eq!(inflate(zlib.finish().unwrap()), b"hello");
        assert_eq!(inflate(b"<html>".to_vec()), b"<html>");
        assert_eq!(inflate(vec![0x1f, 0x8b, 0, 0]), vec![0x1f, 0x8b, 0, 0]);
    }

    #[test]
    fn main_page_is_welcome_url() {
        let site = SiteBuilder::new().file("index.html", "x").file("favicon.png", "p").build();
        assert_eq!(site.source().main_page(), ArchiveUrl::new('A', "index.html"));
    }

    #[test]
    fn short_redirect_lines_skipped() {
        let site = SiteBuilder::new()
            .redirects("a\tA\tindex.html\nbroken line\n\nb\tB\tother.html\n")
            .build();
        let path = site.config.redirects.clone().unwrap();
        let redirects = load_redirects(Path::new(&path)).unwrap();
        let urls: Vec<&str> = redirects.iter().map(|e| e.url.url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b"]);
    }
}
